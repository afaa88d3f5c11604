//! Transaction actions
//!
//! Variant order is the wire discriminant; do not reorder.

use borsh::BorshSerialize;

use super::{AccountId, Balance, CryptoHash, Gas, Nonce, PublicKey};
use super::transaction::SignedDelegateAction;
use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct CreateAccountAction {}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct DeployContractAction {
    pub code: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct FunctionCallAction {
    pub method_name: String,
    /// Raw call arguments; JSON for most contracts.
    pub args: Vec<u8>,
    pub gas: Gas,
    pub deposit: Balance,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct TransferAction {
    pub deposit: Balance,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct StakeAction {
    pub stake: Balance,
    pub public_key: PublicKey,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct FunctionCallPermission {
    /// `None` means unlimited allowance.
    pub allowance: Option<Balance>,
    pub receiver_id: AccountId,
    /// Empty list allows any method.
    pub method_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub enum AccessKeyPermission {
    FunctionCall(FunctionCallPermission),
    FullAccess,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct AccessKey {
    pub nonce: Nonce,
    pub permission: AccessKeyPermission,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct AddKeyAction {
    pub public_key: PublicKey,
    pub access_key: AccessKey,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct DeleteKeyAction {
    pub public_key: PublicKey,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct DeleteAccountAction {
    pub beneficiary_id: AccountId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize)]
pub enum GlobalContractDeployMode {
    /// Referenced by code hash; immutable.
    CodeHash,
    /// Referenced by the deploying account; upgradable by that account.
    AccountId,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct DeployGlobalContractAction {
    pub code: Vec<u8>,
    pub deploy_mode: GlobalContractDeployMode,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub enum GlobalContractIdentifier {
    CodeHash(CryptoHash),
    AccountId(AccountId),
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct UseGlobalContractAction {
    pub contract_identifier: GlobalContractIdentifier,
}

/// One step of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub enum Action {
    CreateAccount(CreateAccountAction),
    DeployContract(DeployContractAction),
    FunctionCall(FunctionCallAction),
    Transfer(TransferAction),
    Stake(StakeAction),
    AddKey(AddKeyAction),
    DeleteKey(DeleteKeyAction),
    DeleteAccount(DeleteAccountAction),
    Delegate(SignedDelegateAction),
    DeployGlobalContract(DeployGlobalContractAction),
    UseGlobalContract(UseGlobalContractAction),
}

impl Action {
    pub fn create_account() -> Self {
        Action::CreateAccount(CreateAccountAction {})
    }

    pub fn transfer(deposit: Balance) -> Self {
        Action::Transfer(TransferAction { deposit })
    }

    /// Function call with JSON arguments.
    pub fn function_call(
        method_name: impl Into<String>,
        args: &serde_json::Value,
        gas: Gas,
        deposit: Balance,
    ) -> Result<Self, ClientError> {
        Ok(Action::FunctionCall(FunctionCallAction {
            method_name: method_name.into(),
            args: serde_json::to_vec(args)?,
            gas,
            deposit,
        }))
    }

    pub fn deploy_contract(code: Vec<u8>) -> Self {
        Action::DeployContract(DeployContractAction { code })
    }

    pub fn stake(stake: Balance, public_key: PublicKey) -> Self {
        Action::Stake(StakeAction { stake, public_key })
    }

    pub fn add_full_access_key(public_key: PublicKey) -> Self {
        Action::AddKey(AddKeyAction {
            public_key,
            access_key: AccessKey {
                nonce: 0,
                permission: AccessKeyPermission::FullAccess,
            },
        })
    }

    pub fn add_function_call_key(
        public_key: PublicKey,
        receiver_id: AccountId,
        method_names: Vec<String>,
        allowance: Option<Balance>,
    ) -> Self {
        Action::AddKey(AddKeyAction {
            public_key,
            access_key: AccessKey {
                nonce: 0,
                permission: AccessKeyPermission::FunctionCall(FunctionCallPermission {
                    allowance,
                    receiver_id,
                    method_names,
                }),
            },
        })
    }

    pub fn delete_key(public_key: PublicKey) -> Self {
        Action::DeleteKey(DeleteKeyAction { public_key })
    }

    pub fn delete_account(beneficiary_id: AccountId) -> Self {
        Action::DeleteAccount(DeleteAccountAction { beneficiary_id })
    }

    pub fn use_global_contract(contract_identifier: GlobalContractIdentifier) -> Self {
        Action::UseGlobalContract(UseGlobalContractAction { contract_identifier })
    }
}

/// An action that may appear inside a delegate action.
///
/// Delegate actions cannot nest, so construction from `Action::Delegate` fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonDelegateAction(Action);

impl NonDelegateAction {
    pub fn into_inner(self) -> Action {
        self.0
    }
}

impl TryFrom<Action> for NonDelegateAction {
    type Error = ClientError;

    fn try_from(action: Action) -> Result<Self, Self::Error> {
        match action {
            Action::Delegate(_) => Err(ClientError::validation(
                "Delegate actions cannot contain nested delegate actions",
            )),
            other => Ok(Self(other)),
        }
    }
}

impl BorshSerialize for NonDelegateAction {
    fn serialize<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

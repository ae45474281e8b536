use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use log::warn;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decimal::{Money, TokenAmount};
use crate::types::{Account, AssetRef, InvoiceItemId};

/// one movement requested from the custody collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CustodyInstruction {
    /// move a non-fungible invoice item
    TransferItem {
        item: InvoiceItemId,
        from: Account,
        to: Account,
    },
    /// move a fungible funding-asset amount
    Transfer {
        asset: AssetRef,
        from: Account,
        to: Account,
        amount: Money,
    },
    Mint {
        token: AssetRef,
        to: Account,
        amount: TokenAmount,
    },
    Burn {
        token: AssetRef,
        from: Account,
        amount: TokenAmount,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CustodyError {
    #[error("unknown asset: {asset}")]
    UnknownAsset {
        asset: AssetRef,
    },

    #[error("insufficient {asset} balance for {account}: available {available}, requested {requested}")]
    InsufficientFunds {
        asset: AssetRef,
        account: Account,
        available: Decimal,
        requested: Decimal,
    },

    #[error("{asset} balance of {account} would overflow")]
    BalanceOverflow {
        asset: AssetRef,
        account: Account,
    },

    #[error("item {item} is not owned by {account}")]
    NotItemOwner {
        item: InvoiceItemId,
        account: Account,
    },

    #[error("custody unavailable: {message}")]
    Unavailable {
        message: String,
    },
}

/// token custody collaborator: transfers, mints and burns on behalf of deals
///
/// `execute` applies a whole batch or nothing.
pub trait TokenCustody: Send + Sync {
    /// whether the reference names an asset custody can move
    fn resolves(&self, asset: &AssetRef) -> bool;

    fn execute(&self, batch: &[CustodyInstruction]) -> Result<(), CustodyError>;
}

type Balances = HashMap<(AssetRef, Account), Decimal>;

#[derive(Debug, Default)]
struct CustodyBook {
    assets: BTreeSet<AssetRef>,
    balances: Balances,
    item_owners: HashMap<InvoiceItemId, Account>,
}

impl CustodyBook {
    fn balance(&self, asset: &AssetRef, account: &Account) -> Decimal {
        self.balances
            .get(&(asset.clone(), account.clone()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    fn known(&self, asset: &AssetRef) -> Result<(), CustodyError> {
        if self.assets.contains(asset) {
            Ok(())
        } else {
            Err(CustodyError::UnknownAsset { asset: asset.clone() })
        }
    }
}

/// the changes of one batch, layered over the book until every instruction succeeded
struct StagedBatch<'a> {
    book: &'a CustodyBook,
    balances: Balances,
    item_owners: HashMap<InvoiceItemId, Account>,
}

impl<'a> StagedBatch<'a> {
    fn new(book: &'a CustodyBook) -> Self {
        Self {
            book,
            balances: HashMap::new(),
            item_owners: HashMap::new(),
        }
    }

    fn balance(&self, asset: &AssetRef, account: &Account) -> Decimal {
        match self.balances.get(&(asset.clone(), account.clone())) {
            Some(staged) => *staged,
            None => self.book.balance(asset, account),
        }
    }

    fn item_owner(&self, item: &InvoiceItemId) -> Option<&Account> {
        self.item_owners.get(item).or_else(|| self.book.item_owners.get(item))
    }

    fn debit(&mut self, asset: &AssetRef, account: &Account, amount: Decimal) -> Result<(), CustodyError> {
        let available = self.balance(asset, account);
        if available < amount {
            return Err(CustodyError::InsufficientFunds {
                asset: asset.clone(),
                account: account.clone(),
                available,
                requested: amount,
            });
        }
        self.balances.insert((asset.clone(), account.clone()), available - amount);
        Ok(())
    }

    fn credit(&mut self, asset: &AssetRef, account: &Account, amount: Decimal) -> Result<(), CustodyError> {
        let total = self
            .balance(asset, account)
            .checked_add(amount)
            .ok_or_else(|| CustodyError::BalanceOverflow {
                asset: asset.clone(),
                account: account.clone(),
            })?;
        self.balances.insert((asset.clone(), account.clone()), total);
        Ok(())
    }

    fn apply(&mut self, instruction: &CustodyInstruction) -> Result<(), CustodyError> {
        match instruction {
            CustodyInstruction::TransferItem { item, from, to } => {
                if self.item_owner(item) != Some(from) {
                    return Err(CustodyError::NotItemOwner {
                        item: item.clone(),
                        account: from.clone(),
                    });
                }
                self.item_owners.insert(item.clone(), to.clone());
            }
            CustodyInstruction::Transfer { asset, from, to, amount } => {
                self.book.known(asset)?;
                self.debit(asset, from, amount.as_decimal())?;
                self.credit(asset, to, amount.as_decimal())?;
            }
            CustodyInstruction::Mint { token, to, amount } => {
                self.book.known(token)?;
                self.credit(token, to, amount.as_decimal())?;
            }
            CustodyInstruction::Burn { token, from, amount } => {
                self.book.known(token)?;
                self.debit(token, from, amount.as_decimal())?;
            }
        }
        Ok(())
    }

    fn into_changes(self) -> (Balances, HashMap<InvoiceItemId, Account>) {
        (self.balances, self.item_owners)
    }
}

/// in-process custody ledger
///
/// used by tests and demos; a batch only touches the book once every
/// instruction in it succeeded.
#[derive(Debug, Default)]
pub struct InMemoryCustody {
    book: Mutex<CustodyBook>,
    fail_next: Mutex<Option<String>>,
}

impl InMemoryCustody {
    pub fn new() -> Self {
        Self::default()
    }

    /// create with a set of known assets
    pub fn with_assets<I, A>(assets: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<AssetRef>,
    {
        let custody = Self::new();
        for asset in assets {
            custody.register_asset(asset.into());
        }
        custody
    }

    pub fn register_asset(&self, asset: AssetRef) {
        if let Ok(mut book) = self.book.lock() {
            book.assets.insert(asset);
        }
    }

    /// credit an account out of thin air (test funding)
    pub fn fund(&self, asset: &AssetRef, account: Account, amount: Money) {
        if let Ok(mut book) = self.book.lock() {
            let funded = book.balance(asset, &account).checked_add(amount.as_decimal());
            match funded {
                Some(total) => {
                    book.balances.insert((asset.clone(), account), total);
                }
                None => warn!("funding {} {} for {} is out of range", amount, asset, account),
            }
        }
    }

    /// record an invoice item as owned by `owner`
    pub fn issue_item(&self, item: InvoiceItemId, owner: Account) {
        if let Ok(mut book) = self.book.lock() {
            book.item_owners.insert(item, owner);
        }
    }

    /// make the next `execute` fail with `Unavailable`
    pub fn fail_next(&self, message: impl Into<String>) {
        if let Ok(mut slot) = self.fail_next.lock() {
            *slot = Some(message.into());
        }
    }

    pub fn balance(&self, asset: &AssetRef, account: &Account) -> Decimal {
        self.book
            .lock()
            .map(|book| book.balance(asset, account))
            .unwrap_or(Decimal::ZERO)
    }

    pub fn item_owner(&self, item: &InvoiceItemId) -> Option<Account> {
        self.book
            .lock()
            .ok()
            .and_then(|book| book.item_owners.get(item).cloned())
    }
}

impl TokenCustody for InMemoryCustody {
    fn resolves(&self, asset: &AssetRef) -> bool {
        self.book
            .lock()
            .map(|book| book.assets.contains(asset))
            .unwrap_or(false)
    }

    fn execute(&self, batch: &[CustodyInstruction]) -> Result<(), CustodyError> {
        let injected = self
            .fail_next
            .lock()
            .map_err(|_| CustodyError::Unavailable { message: "failure slot poisoned".to_string() })?
            .take();
        if let Some(message) = injected {
            return Err(CustodyError::Unavailable { message });
        }

        let mut book = self
            .book
            .lock()
            .map_err(|_| CustodyError::Unavailable { message: "book poisoned".to_string() })?;

        let (balances, item_owners) = {
            let mut staged = StagedBatch::new(&book);
            for instruction in batch {
                staged.apply(instruction)?;
            }
            staged.into_changes()
        };
        book.balances.extend(balances);
        book.item_owners.extend(item_owners);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParticipantId;
    use uuid::Uuid;

    fn usdc() -> AssetRef {
        AssetRef::new("USDC")
    }

    fn alice() -> Account {
        Account::Participant(ParticipantId::new("alice"))
    }

    #[test]
    fn test_transfer_moves_balance() {
        let custody = InMemoryCustody::with_assets(["USDC"]);
        custody.fund(&usdc(), alice(), Money::from_major(100));
        let escrow = Account::Escrow(Uuid::new_v4());

        custody
            .execute(&[CustodyInstruction::Transfer {
                asset: usdc(),
                from: alice(),
                to: escrow.clone(),
                amount: Money::from_major(40),
            }])
            .unwrap();

        assert_eq!(custody.balance(&usdc(), &alice()), Decimal::from(60));
        assert_eq!(custody.balance(&usdc(), &escrow), Decimal::from(40));
    }

    #[test]
    fn test_failed_batch_leaves_book_unchanged() {
        let custody = InMemoryCustody::with_assets(["USDC", "CT"]);
        custody.fund(&usdc(), alice(), Money::from_major(10));
        let escrow = Account::Escrow(Uuid::new_v4());

        let result = custody.execute(&[
            CustodyInstruction::Mint {
                token: AssetRef::new("CT"),
                to: alice(),
                amount: TokenAmount::from_major(5),
            },
            CustodyInstruction::Transfer {
                asset: usdc(),
                from: alice(),
                to: escrow,
                amount: Money::from_major(50),
            },
        ]);

        assert!(matches!(result, Err(CustodyError::InsufficientFunds { .. })));
        assert_eq!(custody.balance(&AssetRef::new("CT"), &alice()), Decimal::ZERO);
        assert_eq!(custody.balance(&usdc(), &alice()), Decimal::from(10));
    }

    #[test]
    fn test_batch_reads_its_own_staged_changes() {
        let custody = InMemoryCustody::with_assets(["USDC"]);
        custody.fund(&usdc(), alice(), Money::from_major(10));
        let escrow = Account::Escrow(Uuid::new_v4());
        let item = InvoiceItemId::new("inv-9");
        custody.issue_item(item.clone(), alice());

        // the second leg spends what the first leg moved
        custody
            .execute(&[
                CustodyInstruction::Transfer {
                    asset: usdc(),
                    from: alice(),
                    to: escrow.clone(),
                    amount: Money::from_major(10),
                },
                CustodyInstruction::Transfer {
                    asset: usdc(),
                    from: escrow.clone(),
                    to: alice(),
                    amount: Money::from_major(4),
                },
                CustodyInstruction::TransferItem {
                    item: item.clone(),
                    from: alice(),
                    to: escrow.clone(),
                },
            ])
            .unwrap();

        assert_eq!(custody.balance(&usdc(), &alice()), Decimal::from(4));
        assert_eq!(custody.balance(&usdc(), &escrow), Decimal::from(6));
        assert_eq!(custody.item_owner(&item), Some(escrow));
    }

    #[test]
    fn test_credit_overflow_rejected() {
        let custody = InMemoryCustody::with_assets(["CT"]);
        let mint = |amount: TokenAmount| CustodyInstruction::Mint {
            token: AssetRef::new("CT"),
            to: alice(),
            amount,
        };
        custody.execute(&[mint(TokenAmount::from_decimal(Decimal::MAX))]).unwrap();

        let result = custody.execute(&[mint(TokenAmount::from_major(1))]);
        assert!(matches!(result, Err(CustodyError::BalanceOverflow { .. })));
        assert_eq!(custody.balance(&AssetRef::new("CT"), &alice()), Decimal::MAX);
    }

    #[test]
    fn test_item_transfer_requires_owner() {
        let custody = InMemoryCustody::new();
        let item = InvoiceItemId::new("inv-1");
        custody.issue_item(item.clone(), alice());
        let bob = Account::Participant(ParticipantId::new("bob"));

        let result = custody.execute(&[CustodyInstruction::TransferItem {
            item: item.clone(),
            from: bob.clone(),
            to: alice(),
        }]);
        assert!(matches!(result, Err(CustodyError::NotItemOwner { .. })));

        custody
            .execute(&[CustodyInstruction::TransferItem {
                item: item.clone(),
                from: alice(),
                to: bob.clone(),
            }])
            .unwrap();
        assert_eq!(custody.item_owner(&item), Some(bob));
    }

    #[test]
    fn test_injected_failure_is_single_shot() {
        let custody = InMemoryCustody::with_assets(["CT"]);
        custody.fail_next("maintenance");

        let mint = [CustodyInstruction::Mint {
            token: AssetRef::new("CT"),
            to: alice(),
            amount: TokenAmount::from_major(1),
        }];
        assert!(matches!(custody.execute(&mint), Err(CustodyError::Unavailable { .. })));
        assert!(custody.execute(&mint).is_ok());
    }

    #[test]
    fn test_unknown_asset_rejected() {
        let custody = InMemoryCustody::new();
        assert!(!custody.resolves(&usdc()));
        let result = custody.execute(&[CustodyInstruction::Mint {
            token: usdc(),
            to: alice(),
            amount: TokenAmount::from_major(1),
        }]);
        assert_eq!(result, Err(CustodyError::UnknownAsset { asset: usdc() }));
    }
}

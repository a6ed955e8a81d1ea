//! Simulation scenarios.

use ledgerbank_common::AccountNumber;
use ledgerbank_ledger::Operation;
use rand::Rng;
use rust_decimal::Decimal;

/// Largest generated amount, in cents.
const MAX_AMOUNT_CENTS: i64 = 10_000;

/// Every scenario needs at least one pair of accounts.
pub const MIN_ACCOUNTS: usize = 2;

/// Workload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Random deposits, withdrawals and transfers across all accounts.
    Mixed,
    /// Transfers back and forth between the first two accounts only.
    OpposingTransfers,
    /// Every operation touches the first account.
    HotAccount,
}

impl Scenario {
    /// Load a scenario by name.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        match name {
            "mixed" => Ok(Scenario::Mixed),
            "opposing-transfers" => Ok(Scenario::OpposingTransfers),
            "hot-account" => Ok(Scenario::HotAccount),
            _ => Err(anyhow::anyhow!("Unknown scenario: {}", name)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Mixed => "mixed",
            Scenario::OpposingTransfers => "opposing-transfers",
            Scenario::HotAccount => "hot-account",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Scenario::Mixed => "Random deposits, withdrawals and transfers",
            Scenario::OpposingTransfers => "A->B and B->A transfers racing on one pair",
            Scenario::HotAccount => "All traffic contends on a single row",
        }
    }

    /// Draw the next operation.
    pub fn next_operation<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        accounts: &[AccountNumber],
    ) -> Operation {
        let amount = Decimal::new(rng.gen_range(1..=MAX_AMOUNT_CENTS), 2);

        match self {
            Scenario::Mixed => {
                let account = pick(rng, accounts);
                match rng.gen_range(0..4) {
                    0 => Operation::Deposit { account, amount },
                    1 => Operation::Withdraw { account, amount },
                    _ => Operation::Transfer {
                        from: account.clone(),
                        to: pick_other(rng, accounts, &account),
                        amount,
                    },
                }
            }
            Scenario::OpposingTransfers => {
                let (a, b) = (accounts[0].clone(), accounts[1].clone());
                if rng.gen_bool(0.5) {
                    Operation::Transfer { from: a, to: b, amount }
                } else {
                    Operation::Transfer { from: b, to: a, amount }
                }
            }
            Scenario::HotAccount => {
                let hot = accounts[0].clone();
                match rng.gen_range(0..4) {
                    0 => Operation::Deposit {
                        account: hot,
                        amount,
                    },
                    1 => Operation::Withdraw {
                        account: hot,
                        amount,
                    },
                    2 => Operation::Transfer {
                        to: pick_other(rng, accounts, &hot),
                        from: hot,
                        amount,
                    },
                    _ => Operation::Transfer {
                        from: pick_other(rng, accounts, &hot),
                        to: hot,
                        amount,
                    },
                }
            }
        }
    }
}

fn pick<R: Rng + ?Sized>(rng: &mut R, accounts: &[AccountNumber]) -> AccountNumber {
    accounts[rng.gen_range(0..accounts.len())].clone()
}

fn pick_other<R: Rng + ?Sized>(
    rng: &mut R,
    accounts: &[AccountNumber],
    not: &AccountNumber,
) -> AccountNumber {
    loop {
        let candidate = pick(rng, accounts);
        if &candidate != not {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn accounts() -> Vec<AccountNumber> {
        ["1000000001", "1000000002", "1000000003"]
            .into_iter()
            .map(AccountNumber::from)
            .collect()
    }

    #[test]
    fn test_load() {
        for name in ["mixed", "opposing-transfers", "hot-account"] {
            assert_eq!(Scenario::load(name).unwrap().name(), name);
        }
        assert!(Scenario::load("high-volume").is_err());
    }

    #[test]
    fn test_opposing_transfers_stay_on_one_pair() {
        let accounts = accounts();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            match Scenario::OpposingTransfers.next_operation(&mut rng, &accounts) {
                Operation::Transfer { from, to, .. } => {
                    assert_ne!(from, to);
                    assert!(from == accounts[0] || from == accounts[1]);
                    assert!(to == accounts[0] || to == accounts[1]);
                }
                other => panic!("unexpected operation {other:?}"),
            }
        }
    }

    #[test]
    fn test_hot_account_is_always_involved() {
        let accounts = accounts();
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..200 {
            let op = Scenario::HotAccount.next_operation(&mut rng, &accounts);
            let involved = match &op {
                Operation::Deposit { account, .. } | Operation::Withdraw { account, .. } => {
                    account == &accounts[0]
                }
                Operation::Transfer { from, to, .. } => {
                    assert_ne!(from, to);
                    from == &accounts[0] || to == &accounts[0]
                }
            };
            assert!(involved);
            assert!(op.amount() > Decimal::ZERO);
        }
    }
}

pub mod ledger;
pub mod paddle;

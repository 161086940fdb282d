mod account;
pub mod currency;
mod money;
mod transaction;

pub use account::Account;
pub use money::Money;
pub use transaction::Transaction;

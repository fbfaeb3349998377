//! Error taxonomy for the translator (spec section 7).

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("virtual address {0} is out of range")]
    AddressOutOfRange(u64),
}

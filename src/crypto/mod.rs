// Cryptographic primitives for envelope protection and signing.

pub mod cbc;
pub mod keywrap;
pub mod nonce;
pub mod sign;

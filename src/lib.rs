//! envsafe - Passphrase-encrypted sidecar files for secrets such as `.env`

#![forbid(unsafe_code)]

pub mod config;
pub mod content;
pub mod error;
pub mod identity;
pub mod passphrase;
pub mod resolver;
pub mod secret_store;
pub mod secretcrypt;
pub mod varmor;
pub mod workflow;

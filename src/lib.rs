//! Trusted worker for the Let's eSign Proof-of-Intent signing protocol,
//! running inside an AWS Nitro Enclave. Polls a loopback host for jobs,
//! executes one of three signing-protocol job handlers, and emits an
//! attestation document binding the produced outputs to this enclave
//! image and job identity.

pub mod attestation;
pub mod bundle;
pub mod canonical_json;
pub mod config;
pub mod crypto;
pub mod decryptor;
pub mod errcode;
pub mod handlers;
pub mod host;
pub mod job;
pub mod kms;
pub mod mail;
pub mod nsm;
pub mod payload;
pub mod pdf;
pub mod proto;
pub mod twilio;
pub mod worker;

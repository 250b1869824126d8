//! Clients for the external classification and text-generation collaborators.

pub mod client;

pub use client::{DisabledCollaborator, HttpTextCollaborator};

//! Utility implementations: in-memory store for tests and demos

pub mod memory_store;

pub use memory_store::MemoryStore;

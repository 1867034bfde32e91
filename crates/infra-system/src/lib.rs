// Parcel Infrastructure - System Adapters
// Implements: ArtifactStore on the local filesystem

pub mod artifact_store_impl;

pub use artifact_store_impl::LocalArtifactStore;

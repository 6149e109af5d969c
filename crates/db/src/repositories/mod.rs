//! Query helpers grouped by table.

pub mod attachment_repo;

pub use attachment_repo::AttachmentRepo;

//! Repository traits over the metadata schema.

pub mod chunks;
pub mod sessions;

pub use chunks::ChunkRepo;
pub use sessions::SessionRepo;

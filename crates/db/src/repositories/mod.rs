mod snapshot_repo;

pub use snapshot_repo::SnapshotRepo;

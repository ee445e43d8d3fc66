// Consumers of published snapshots

pub mod imgstream;

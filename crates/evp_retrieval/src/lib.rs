pub mod context;
pub mod embeddings;
pub mod evidence;
pub mod index;
pub mod ingest;
pub mod pack;
pub mod retrieve;

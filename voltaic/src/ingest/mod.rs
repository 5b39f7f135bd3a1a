pub mod indexer;
pub mod parsers;
pub mod router;
pub mod tar_stream;

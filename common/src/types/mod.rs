pub mod chunk_document;
pub mod crawl_run;
pub mod document;
pub mod vector_spec;

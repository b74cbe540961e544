pub mod binsearch;
pub mod docmap;
pub mod driver;
pub mod error;
pub mod eval;
pub mod index;
pub mod posting;
pub mod ranker;
pub mod record_parser;
pub mod spimi;
pub mod tokenizer;

pub use docmap::{DocMapReader, DocMapWriter};
pub use driver::{build_index, search_index};
pub use error::{IrError, Result};
pub use index::InvertedIndex;
pub use posting::{PostingClass, PostingList};
pub use ranker::{ranker_factory, Ranker};
pub use record_parser::RecordParser;
pub use spimi::SpimiIndexer;
pub use tokenizer::Tokenizer;

mod assemble;
mod error;
mod output;
mod segment;
mod symtab;

pub use assemble::assemble;
pub use error::{AsmError, AsmErrorKind};
pub use output::{decode_binary, encode_binary, encode_card_deck, listing};
pub use segment::Segment;

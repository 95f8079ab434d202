mod block;
mod block_header;
mod header;
pub(crate) mod pileup;
pub(crate) mod range_coder;
mod utils;

pub use block::QualityBlock;
pub(crate) use block::RecordLayout;
pub use block_header::{BlockHeader, SIZE_BLOCK_HEADER};
pub use header::{FileHeader, SIZE_HEADER};

use crate::{BLOCK_MAGIC, FILE_MAGIC, FILE_VERSION};

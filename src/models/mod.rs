mod analysis;
mod response;
mod transaction;

pub use analysis::{AccountDetails, AnalysisResult, ApiCost, Transactions};
pub use response::{
    DetailBody, Envelope, ErrorBody, ExtractionMetadata, StatementCheck, UploadResponse,
};
pub use transaction::Transaction;

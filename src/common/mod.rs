pub mod density;
pub mod divector;
pub mod fieldsummarizer;
pub mod intervals;
pub mod rangevector;
pub mod samplesummary;
pub mod syntheticdata;

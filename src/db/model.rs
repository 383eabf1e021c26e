//! Database entity and view models used by repositories.
//!
//! Keep these structs focused on the data returned by queries. Business logic
//! should live in higher layers.

/// A job ready to be enqueued. The id is minted by the caller.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: String,
    pub prompt: String,
    pub language: Option<String>,
    pub image_data_uri: String,
}

/// Job slice handed to the pipeline after a successful claim.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: String,
    pub prompt: String,
    pub language: Option<String>,
    pub image_data_uri: String,
}

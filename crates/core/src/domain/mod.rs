pub mod crosspost;
pub mod extraction;
pub mod jargon;
pub mod listing;
pub mod message;
pub mod reference;
pub mod review;
pub mod rules;
pub mod task;

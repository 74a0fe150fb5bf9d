// Catalog consistency engine and its collaborators
pub mod catalog;

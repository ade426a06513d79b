pub mod crawl;
pub mod project;
pub mod test;

pub mod actor;
pub mod html_page;
pub mod rss_feed;
pub mod source;

//! HTTP downloads of release tarballs.

mod client;

pub use client::HttpClient;

#![allow(dead_code)]

pub mod backend;
pub mod models;

use uri_store::{Uri, RequestContext};

pub fn ctx() -> RequestContext {
    RequestContext::background()
}

pub fn uri(value: &str) -> Uri {
    Uri::parse(value).unwrap()
}

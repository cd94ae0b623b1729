mod lifecycle;
mod properties;
mod resolution;
mod store_failure;

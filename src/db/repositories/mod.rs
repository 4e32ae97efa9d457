mod retention;
mod samples;

pub use samples::NewSample;

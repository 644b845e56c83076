mod header_decoder;

pub use header_decoder::HeaderDecoder;

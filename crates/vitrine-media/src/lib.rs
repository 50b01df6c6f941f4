// Photo upload and listing against the relay's HTTP endpoints.

pub mod gateway;

pub use gateway::{MediaError, PhotoGateway, UploadedPhoto};

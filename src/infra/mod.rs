// Adapters for external systems behind the app ports

pub mod youtube_client;

pub use youtube_client::YoutubeClient;

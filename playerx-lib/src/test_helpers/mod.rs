pub mod http_server;
pub mod recording_window;

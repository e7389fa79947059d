pub mod device_session;
pub mod qr_session;
pub mod user;

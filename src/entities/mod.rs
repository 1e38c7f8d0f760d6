pub mod attachment;
pub mod connection;
pub mod contact;
pub mod invoice;

pub mod a2s;
pub mod master;
pub mod mcrcon;
pub mod rcon;

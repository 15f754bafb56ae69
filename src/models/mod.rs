pub mod job;
pub mod screenshot;
pub mod subscription;

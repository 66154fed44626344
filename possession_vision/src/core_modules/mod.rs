pub mod artifact_store;
pub mod crop;
pub mod detection;
pub mod detection_adapter;
pub mod frame_source;
pub mod pixel;
pub mod possession;
pub mod renderer;
pub mod team_classifier;

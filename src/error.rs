use thiserror::Error;

/// Rejected physics configuration. Raised before any rapier state is built.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    #[error("physics is disabled in the configuration")]
    Disabled,
    #[error("fixed simulation rate must be positive, got {0}")]
    InvalidRate(u32),
    #[error("max steps per frame must be at least 1")]
    NoStepsAllowed,
    #[error("solver iterations must be at least 1")]
    NoSolverIterations,
    #[error("invalid player capsule: radius {radius}, half height {half_height}")]
    InvalidCapsule { radius: f32, half_height: f32 },
    #[error("environment mesh has {vertices} vertices and {indices} indices, which is not a triangle list")]
    InvalidMesh { vertices: usize, indices: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("storage is unavailable: {0}")]
    Unavailable(String),
    #[error("storage rejected write of `{key}`: {reason}")]
    WriteFailed { key: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioError {
    #[error("audio context is not initialized")]
    NotInitialized,
    #[error("sound `{0}` is not loaded")]
    UnknownSound(String),
    #[error("sound `{0}` is loaded but not decoded yet")]
    NotDecoded(String),
    #[error("audio backend failure: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CharacterError {
    #[error("character definition is missing an id")]
    MissingId,
    #[error("character `{0}` has no display name")]
    MissingName(String),
    #[error("character `{0}` has no model reference")]
    MissingModel(String),
    #[error("character `{0}` has a non-finite initial pose")]
    InvalidPose(String),
    #[error("character `{0}` is already spawned")]
    Duplicate(String),
}

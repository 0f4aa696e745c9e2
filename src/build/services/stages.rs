//! Ordered stage descriptors iterated by the pipeline executor.

use crate::build::domain::{DurationField, SourceSlot, StageName};

/// Work performed by a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageBody {
    /// Synchronise a working tree to the requested branch.
    Fetch(SourceSlot),
    /// Run the native build of one source repository.
    Build(SourceSlot),
    /// Store the build output as the task artifact.
    Package,
}

/// One pipeline stage as data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDescriptor {
    /// Stage name recorded on the task and its log.
    pub name: StageName,
    /// Progress percentage assigned at stage start.
    pub checkpoint: u8,
    /// Progress message shown while the stage runs.
    pub message: &'static str,
    /// Task field receiving the stage duration, if any.
    pub duration_field: Option<DurationField>,
    /// Stage body.
    pub body: StageBody,
}

/// The fixed stage order. Checkpoints increase strictly.
pub const PIPELINE: [StageDescriptor; 5] = [
    StageDescriptor {
        name: StageName::FetchA,
        checkpoint: 10,
        message: "Fetching source A repository",
        duration_field: Some(DurationField::FetchA),
        body: StageBody::Fetch(SourceSlot::A),
    },
    StageDescriptor {
        name: StageName::BuildA,
        checkpoint: 30,
        message: "Building source A",
        duration_field: Some(DurationField::BuildA),
        body: StageBody::Build(SourceSlot::A),
    },
    StageDescriptor {
        name: StageName::FetchB,
        checkpoint: 50,
        message: "Fetching source B repository",
        duration_field: Some(DurationField::FetchB),
        body: StageBody::Fetch(SourceSlot::B),
    },
    StageDescriptor {
        name: StageName::BuildB,
        checkpoint: 70,
        message: "Building source B",
        duration_field: Some(DurationField::BuildB),
        body: StageBody::Build(SourceSlot::B),
    },
    StageDescriptor {
        name: StageName::Package,
        checkpoint: 90,
        message: "Saving build artifact",
        duration_field: None,
        body: StageBody::Package,
    },
];

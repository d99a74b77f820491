mod code_artifact_types;
mod code_hash;
mod compilation_artifacts;
mod creation_code_artifacts;
mod match_status;
mod normalization;
mod runtime_code_artifacts;
mod verification_match;

mod verification_match_transformations;
mod verification_match_values;

pub use code_artifact_types::{
    CborAuxdata, CborAuxdataValue, ImmutableReferences, LinkReferences, Offset, Offsets,
};
pub use code_hash::{keccak256, sha256, CodeHash};
pub use compilation_artifacts::{CompilationArtifacts, ToCompilationArtifacts};
pub use creation_code_artifacts::{CreationCodeArtifacts, ToCreationCodeArtifacts};
pub use match_status::{is_status_upgrade, status_pair_rank, MatchStatus, MatchStatusPair};
pub use normalization::normalize_library_placeholders;
pub use runtime_code_artifacts::{RuntimeCodeArtifacts, ToRuntimeCodeArtifacts};
pub use verification_match::{
    verify_creation_code, verify_runtime_code, Match, MatchBuilder, MatchTransformation,
    MatchValues,
};

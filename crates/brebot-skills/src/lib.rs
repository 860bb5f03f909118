//! Skill executor seam for the Brebot operator service.
//!
//! A skill is a named capability (send an email, call an API, draft a
//! document) invoked with JSON inputs. The orchestrator never performs side
//! effects itself; it drives skills through the [`Skill`] trait and consults
//! the [`SkillRegistry`] for each skill's autonomy policy.

pub mod policy;
pub mod registry;
pub mod skill;

pub use policy::SkillPolicy;
pub use registry::{SkillInfo, SkillRegistry};
pub use skill::{ArtifactDraft, Skill, SkillCall, SkillDescriptor, SkillOutput};

use std::sync::Arc;

use revisor_types::{Guidelines, InputPacket, PersonaProfile, QualityTargets, RunId};

/// What collaborators see of a run: the validated packet and the gate they are
/// held to.
#[derive(Debug, Clone)]
pub struct Brief {
    pub packet: Arc<InputPacket>,
    pub pass_threshold: u32,
}

impl Brief {
    pub fn new(packet: Arc<InputPacket>, pass_threshold: u32) -> Self {
        Self {
            packet,
            pass_threshold,
        }
    }

    pub fn topic(&self) -> &str {
        &self.packet.topic
    }

    pub fn guidelines(&self) -> &Guidelines {
        &self.packet.guidelines
    }

    pub fn persona(&self) -> &PersonaProfile {
        &self.packet.persona_profile
    }

    pub fn quality_targets(&self) -> &QualityTargets {
        &self.packet.quality_targets
    }
}

/// Per-run constants fixed at start.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: RunId,
    pub brief: Brief,
    pub max_iterations: u32,
}

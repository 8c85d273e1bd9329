use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

const ID_RANGE: std::ops::RangeInclusive<u32> = 10_000_000..=99_999_999;
const PHONE_PREFIX: &str = "+569";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, Serialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueType {
    Caja,
    Personal,
    Empresas,
    Gerencia,
}

impl QueueType {
    pub const ALL: [QueueType; 4] = [
        QueueType::Caja,
        QueueType::Personal,
        QueueType::Empresas,
        QueueType::Gerencia,
    ];
}

/// Body of one ticket creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketPayload {
    pub national_id: String,
    pub telefono: String,
    pub branch_office: Arc<str>,
    pub queue_type: QueueType,
}

/// Per-VU source of ticket payloads. Never shared between VUs.
#[derive(Debug, Clone)]
pub struct PayloadGenerator {
    rng: SmallRng,
    branch_office: Arc<str>,
}

impl PayloadGenerator {
    pub fn new(branch_office: impl Into<Arc<str>>) -> Self {
        Self {
            rng: SmallRng::from_entropy(),
            branch_office: branch_office.into(),
        }
    }

    pub fn seeded(seed: u64, branch_office: impl Into<Arc<str>>) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            branch_office: branch_office.into(),
        }
    }

    pub fn generate(&mut self) -> TicketPayload {
        let national_id = self.rng.gen_range(ID_RANGE);
        let phone = self.rng.gen_range(ID_RANGE);
        let queue_type = QueueType::ALL[self.rng.gen_range(0..QueueType::ALL.len())];

        TicketPayload {
            national_id: national_id.to_string(),
            telefono: format!("{PHONE_PREFIX}{phone}"),
            branch_office: self.branch_office.clone(),
            queue_type,
        }
    }
}

//! Drop detection: decides whether an observation is a real discount.
//!
//! [`decide`] is a pure function of the observation, the stored state, the
//! policy and the current time. It never touches disk or network.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use common::{Alert, Config, ConfigError, Observation, ProductRef, ProductState, ReferenceMode};

/// Minimum economy (in BRL) required when the reference price falls in a bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EconomyBracket {
    /// Inclusive upper bound of the reference price; `None` matches everything
    pub max_reference: Option<Decimal>,
    pub minimum_economy: Decimal,
}

pub const DEFAULT_BRACKETS: [EconomyBracket; 4] = [
    EconomyBracket {
        max_reference: Some(dec!(200)),
        minimum_economy: dec!(15),
    },
    EconomyBracket {
        max_reference: Some(dec!(500)),
        minimum_economy: dec!(40),
    },
    EconomyBracket {
        max_reference: Some(dec!(1500)),
        minimum_economy: dec!(80),
    },
    EconomyBracket {
        max_reference: None,
        minimum_economy: dec!(150),
    },
];

/// Parse `200:15,500:40,*:150` into brackets sorted by upper bound.
pub fn parse_brackets(raw: &str) -> Result<Vec<EconomyBracket>, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        var: "ECONOMY_BRACKETS".to_string(),
        value: raw.to_string(),
    };

    let mut brackets = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (bound, economy) = part.split_once(':').ok_or_else(invalid)?;
        let max_reference = match bound.trim() {
            "*" => None,
            b => Some(b.parse::<Decimal>().map_err(|_| invalid())?),
        };
        let minimum_economy: Decimal = economy.trim().parse().map_err(|_| invalid())?;
        if minimum_economy < Decimal::ZERO {
            return Err(invalid());
        }
        brackets.push(EconomyBracket {
            max_reference,
            minimum_economy,
        });
    }

    if brackets.is_empty() {
        return Err(invalid());
    }

    // Catch-all goes last
    brackets.sort_by(|a, b| match (a.max_reference, b.max_reference) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    Ok(brackets)
}

/// Alert policy.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub drop_threshold_percent: Decimal,
    pub economy_brackets: Vec<EconomyBracket>,
    pub cooldown: Duration,
    pub suspicious_price_ratio: Decimal,
    pub history_limit: usize,
    pub reference_mode: ReferenceMode,
    pub moving_average_window: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            drop_threshold_percent: dec!(15),
            economy_brackets: DEFAULT_BRACKETS.to_vec(),
            cooldown: Duration::hours(12),
            suspicious_price_ratio: dec!(0.4),
            history_limit: 30,
            reference_mode: ReferenceMode::HistoricalLow,
            moving_average_window: 7,
        }
    }
}

impl PolicyConfig {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let economy_brackets = match &config.economy_brackets {
            Some(raw) => parse_brackets(raw)?,
            None => DEFAULT_BRACKETS.to_vec(),
        };
        Ok(Self {
            drop_threshold_percent: config.drop_threshold_percent,
            economy_brackets,
            cooldown: Duration::hours(config.cooldown_hours),
            suspicious_price_ratio: config.suspicious_price_ratio,
            history_limit: config.history_limit,
            reference_mode: config.reference_mode,
            moving_average_window: config.moving_average_window,
        })
    }

    /// Minimum economy for a reference price. Zero when no bracket matches.
    pub fn minimum_economy(&self, reference: Decimal) -> Decimal {
        self.economy_brackets
            .iter()
            .find(|b| b.max_reference.map_or(true, |max| reference <= max))
            .map(|b| b.minimum_economy)
            .unwrap_or(Decimal::ZERO)
    }

    fn reference_price(&self, state: &ProductState) -> Option<Decimal> {
        match self.reference_mode {
            ReferenceMode::HistoricalLow => state.lowest_price,
            ReferenceMode::MovingAverage => state
                .moving_average(self.moving_average_window)
                .or(state.lowest_price),
        }
    }
}

/// What happened to one observation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    NoPrice,
    Baseline,
    NoImprovement,
    Suspicious {
        price: Decimal,
        reference: Decimal,
    },
    BelowThreshold {
        drop_percent: Decimal,
    },
    BelowMinimumEconomy {
        economy: Decimal,
        minimum: Decimal,
    },
    CooldownActive {
        last_alert_at: DateTime<Utc>,
    },
    Alert(Alert),
}

impl Outcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::NoPrice => "no_price",
            Outcome::Baseline => "baseline",
            Outcome::NoImprovement => "no_improvement",
            Outcome::Suspicious { .. } => "suspicious",
            Outcome::BelowThreshold { .. } => "below_threshold",
            Outcome::BelowMinimumEconomy { .. } => "below_minimum_economy",
            Outcome::CooldownActive { .. } => "cooldown_active",
            Outcome::Alert(_) => "alert",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Suspicious { price, reference } => {
                write!(f, "suspicious price {} against reference {}", price, reference)
            }
            Outcome::BelowThreshold { drop_percent } => {
                write!(f, "drop of {:.1}% is below threshold", drop_percent)
            }
            Outcome::BelowMinimumEconomy { economy, minimum } => {
                write!(f, "economy R$ {:.2} below minimum R$ {:.2}", economy, minimum)
            }
            Outcome::CooldownActive { last_alert_at } => {
                write!(f, "cooldown active since {}", last_alert_at.to_rfc3339())
            }
            Outcome::Alert(alert) => write!(f, "alert: {}", alert.summary()),
            other => f.write_str(other.kind()),
        }
    }
}

/// Result of [`decide`]. `next_state` is `None` when nothing should be written.
#[derive(Debug, Clone)]
pub struct Decision {
    pub next_state: Option<ProductState>,
    pub outcome: Outcome,
}

/// Decide on one observation.
pub fn decide(
    product: &ProductRef,
    observation: &Observation,
    state: Option<&ProductState>,
    policy: &PolicyConfig,
    now: DateTime<Utc>,
) -> Decision {
    let Some(price) = observation.price else {
        return Decision {
            next_state: None,
            outcome: Outcome::NoPrice,
        };
    };

    let reference = state.and_then(|s| policy.reference_price(s));
    let mut next = state.cloned().unwrap_or_default();
    next.record_price(price, now, policy.history_limit);
    next.title = Some(observation.title.clone());
    next.consecutive_failure_count = 0;

    let Some(reference) = reference else {
        return Decision {
            next_state: Some(next),
            outcome: Outcome::Baseline,
        };
    };

    let outcome = evaluate_drop(product, observation, price, reference, &mut next, policy, now);
    Decision {
        next_state: Some(next),
        outcome,
    }
}

fn evaluate_drop(
    product: &ProductRef,
    observation: &Observation,
    price: Decimal,
    reference: Decimal,
    next: &mut ProductState,
    policy: &PolicyConfig,
    now: DateTime<Utc>,
) -> Outcome {
    if price >= reference || reference <= Decimal::ZERO {
        return Outcome::NoImprovement;
    }

    if price < reference * policy.suspicious_price_ratio {
        return Outcome::Suspicious { price, reference };
    }

    let economy = reference - price;
    let raw_drop = economy / reference * dec!(100);
    // Rounded for display only; the threshold sees the exact value
    let drop_percent = raw_drop.round_dp(2);

    if raw_drop < policy.drop_threshold_percent {
        return Outcome::BelowThreshold { drop_percent };
    }

    let minimum = policy.minimum_economy(reference);
    if economy < minimum {
        return Outcome::BelowMinimumEconomy { economy, minimum };
    }

    if let Some(last_alert_at) = next.last_alert_at {
        if now - last_alert_at < policy.cooldown {
            return Outcome::CooldownActive { last_alert_at };
        }
    }

    next.last_alert_at = Some(now);
    Outcome::Alert(Alert {
        platform: product.platform,
        external_id: product.external_id.clone(),
        title: observation.title.clone(),
        price,
        reference_price: reference,
        drop_percent,
        economy,
        url: observation.canonical_url.clone(),
        image_url: observation.image_url.clone(),
    })
}

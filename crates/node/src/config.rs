//! Option parsing for the assembler and the staker.

use blackd_consensus::constants::DEFAULT_BLOCK_MAX_WEIGHT;
use blackd_consensus::money::parse_money;

use crate::fees::FeeRate;

pub const DEFAULT_STAKETIMIO_MS: u64 = 500;
pub const DEFAULT_BLOCK_MIN_TX_FEE: i64 = 1_000;

#[derive(Clone, Debug)]
pub struct AssemblerOptions {
    pub block_max_weight: usize,
    pub block_min_fee_rate: FeeRate,
    /// Regtest-only `-blockversion` override for fork testing.
    pub block_version_override: Option<i32>,
    pub print_priority: bool,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            block_max_weight: DEFAULT_BLOCK_MAX_WEIGHT,
            block_min_fee_rate: FeeRate::from_sat_per_kvb(DEFAULT_BLOCK_MIN_TX_FEE),
            block_version_override: None,
            print_priority: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct StakingOptions {
    pub staking_enabled: bool,
    /// Baseline staking idle period in milliseconds; the loop adds
    /// 30·sqrt(stakeable UTXOs) on top.
    pub stake_timio_ms: u64,
}

impl Default for StakingOptions {
    fn default() -> Self {
        Self {
            staking_enabled: true,
            stake_timio_ms: DEFAULT_STAKETIMIO_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionError {
    InvalidValue { option: &'static str, value: String },
}

impl std::fmt::Display for OptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionError::InvalidValue { option, value } => {
                write!(f, "invalid value for {option}: {value}")
            }
        }
    }
}

impl std::error::Error for OptionError {}

fn parse_bool_flag(value: Option<&str>) -> Option<bool> {
    match value {
        None => Some(true),
        Some("1") => Some(true),
        Some("0") => Some(false),
        Some(_) => None,
    }
}

/// Apply daemon-style `-option[=value]` arguments onto the defaults.
/// Unrecognized options are left for other subsystems.
pub fn apply_args(
    args: &[String],
    assembler: &mut AssemblerOptions,
    staking: &mut StakingOptions,
) -> Result<(), OptionError> {
    for arg in args {
        let arg = arg.strip_prefix('-').unwrap_or(arg);
        let (name, value) = match arg.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (arg, None),
        };

        match name {
            "staking" => {
                staking.staking_enabled =
                    parse_bool_flag(value).ok_or_else(|| OptionError::InvalidValue {
                        option: "-staking",
                        value: value.unwrap_or_default().to_string(),
                    })?;
            }
            "nostaking" => {
                staking.staking_enabled = false;
            }
            "staketimio" => {
                let raw = value.unwrap_or_default();
                staking.stake_timio_ms =
                    raw.parse().map_err(|_| OptionError::InvalidValue {
                        option: "-staketimio",
                        value: raw.to_string(),
                    })?;
            }
            "blockmaxweight" => {
                let raw = value.unwrap_or_default();
                assembler.block_max_weight =
                    raw.parse().map_err(|_| OptionError::InvalidValue {
                        option: "-blockmaxweight",
                        value: raw.to_string(),
                    })?;
            }
            "blockmintxfee" => {
                let raw = value.unwrap_or_default();
                let amount = parse_money(raw).ok_or_else(|| OptionError::InvalidValue {
                    option: "-blockmintxfee",
                    value: raw.to_string(),
                })?;
                assembler.block_min_fee_rate = FeeRate::from_sat_per_kvb(amount);
            }
            "blockversion" => {
                let raw = value.unwrap_or_default();
                let version = raw.parse().map_err(|_| OptionError::InvalidValue {
                    option: "-blockversion",
                    value: raw.to_string(),
                })?;
                assembler.block_version_override = Some(version);
            }
            "printpriority" => {
                assembler.print_priority =
                    parse_bool_flag(value).ok_or_else(|| OptionError::InvalidValue {
                        option: "-printpriority",
                        value: value.unwrap_or_default().to_string(),
                    })?;
            }
            "debug" => {
                let raw = value.unwrap_or_default();
                let category =
                    blackd_log::Category::parse(raw).ok_or_else(|| OptionError::InvalidValue {
                        option: "-debug",
                        value: raw.to_string(),
                    })?;
                blackd_log::enable_category(category);
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use blackd_consensus::money::COIN;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults() {
        let assembler = AssemblerOptions::default();
        let staking = StakingOptions::default();
        assert_eq!(assembler.block_max_weight, DEFAULT_BLOCK_MAX_WEIGHT);
        assert!(staking.staking_enabled);
        assert_eq!(staking.stake_timio_ms, DEFAULT_STAKETIMIO_MS);
    }

    #[test]
    fn staking_flags() {
        let mut assembler = AssemblerOptions::default();
        let mut staking = StakingOptions::default();
        apply_args(&args(&["-staking=0"]), &mut assembler, &mut staking).expect("parse");
        assert!(!staking.staking_enabled);

        apply_args(&args(&["-staking"]), &mut assembler, &mut staking).expect("parse");
        assert!(staking.staking_enabled);

        apply_args(&args(&["-nostaking"]), &mut assembler, &mut staking).expect("parse");
        assert!(!staking.staking_enabled);
    }

    #[test]
    fn assembler_options() {
        let mut assembler = AssemblerOptions::default();
        let mut staking = StakingOptions::default();
        apply_args(
            &args(&[
                "-blockmaxweight=100000",
                "-blockmintxfee=0.0001",
                "-staketimio=250",
                "-printpriority",
                "-blockversion=5",
            ]),
            &mut assembler,
            &mut staking,
        )
        .expect("parse");
        assert_eq!(assembler.block_max_weight, 100_000);
        assert_eq!(
            assembler.block_min_fee_rate,
            FeeRate::from_sat_per_kvb(COIN / 10_000)
        );
        assert_eq!(staking.stake_timio_ms, 250);
        assert!(assembler.print_priority);
        assert_eq!(assembler.block_version_override, Some(5));
    }

    #[test]
    fn bad_values_are_rejected() {
        let mut assembler = AssemblerOptions::default();
        let mut staking = StakingOptions::default();
        assert!(apply_args(&args(&["-staketimio=abc"]), &mut assembler, &mut staking).is_err());
        assert!(apply_args(&args(&["-blockmintxfee=nope"]), &mut assembler, &mut staking).is_err());
        assert!(apply_args(&args(&["-staking=2"]), &mut assembler, &mut staking).is_err());
    }

    #[test]
    fn unknown_options_pass_through() {
        let mut assembler = AssemblerOptions::default();
        let mut staking = StakingOptions::default();
        apply_args(&args(&["-rpcport=1234"]), &mut assembler, &mut staking).expect("parse");
    }

    #[test]
    fn debug_option_flips_the_category_mask() {
        use blackd_log::Category;

        let mut assembler = AssemblerOptions::default();
        let mut staking = StakingOptions::default();
        apply_args(&args(&["-debug=coinstake"]), &mut assembler, &mut staking).expect("parse");
        assert!(blackd_log::will_log_category(Category::Coinstake));
        blackd_log::disable_category(Category::Coinstake);

        assert!(apply_args(&args(&["-debug=nope"]), &mut assembler, &mut staking).is_err());
    }
}

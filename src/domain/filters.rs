use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use std::fmt;

use crate::domain::honeypot::HoneypotResult;

/// Risk appetite presets. `Custom` carries user-supplied filters verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterPreset {
    Conservative,
    Balanced,
    Aggressive,
    Custom,
}

/// Liquidity-lock state as reported by the lock registry.
///
/// `Unknown` covers lock providers we do not enumerate; it is never
/// treated as unlocked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LockStatus {
    Locked { pct: f64 },
    Unlocked,
    Unknown,
}

/// Sparse predicate set applied to a candidate token.
///
/// Every field is optional; absent predicates pass. Range pairs must
/// satisfy `min <= max` where both are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SniperFilters {
    pub require_mint_authority_disabled: Option<bool>,
    pub require_freeze_authority_disabled: Option<bool>,

    pub min_liquidity_lamports: Option<u64>,
    pub max_liquidity_lamports: Option<u64>,

    pub max_top10_holder_pct: Option<f64>,
    pub max_single_holder_pct: Option<f64>,
    pub max_dev_holding_pct: Option<f64>,
    pub min_holder_count: Option<u32>,

    pub max_buy_tax_pct: Option<f64>,
    pub max_sell_tax_pct: Option<f64>,

    pub min_pool_supply_pct: Option<f64>,
    pub max_pool_supply_pct: Option<f64>,

    pub require_metadata: Option<bool>,
    pub require_socials: Option<bool>,

    pub max_risk_score: Option<f64>,
    pub min_confidence: Option<f64>,

    pub min_lock_pct: Option<f64>,

    pub require_sell_simulation: Option<bool>,

    pub blacklist: HashSet<Pubkey>,
    pub whitelist: HashSet<Pubkey>,
}

impl SniperFilters {
    pub fn conservative() -> Self {
        Self {
            require_mint_authority_disabled: Some(true),
            require_freeze_authority_disabled: Some(true),
            min_liquidity_lamports: Some(10_000_000_000), // 10 SOL
            max_top10_holder_pct: Some(60.0),
            max_single_holder_pct: Some(30.0),
            max_dev_holding_pct: Some(10.0),
            min_holder_count: Some(100),
            max_buy_tax_pct: Some(5.0),
            max_sell_tax_pct: Some(5.0),
            require_metadata: Some(true),
            max_risk_score: Some(40.0),
            min_confidence: Some(60.0),
            min_lock_pct: Some(80.0),
            require_sell_simulation: Some(true),
            ..Default::default()
        }
    }

    pub fn balanced() -> Self {
        Self {
            require_mint_authority_disabled: Some(true),
            require_freeze_authority_disabled: Some(true),
            min_liquidity_lamports: Some(2_000_000_000), // 2 SOL
            max_top10_holder_pct: Some(80.0),
            max_single_holder_pct: Some(40.0),
            min_holder_count: Some(25),
            max_buy_tax_pct: Some(10.0),
            max_sell_tax_pct: Some(10.0),
            max_risk_score: Some(60.0),
            min_confidence: Some(40.0),
            min_lock_pct: Some(50.0),
            ..Default::default()
        }
    }

    pub fn aggressive() -> Self {
        Self {
            require_freeze_authority_disabled: Some(true),
            min_liquidity_lamports: Some(500_000_000), // 0.5 SOL
            max_single_holder_pct: Some(60.0),
            max_sell_tax_pct: Some(25.0),
            max_risk_score: Some(80.0),
            ..Default::default()
        }
    }

    pub fn for_preset(preset: FilterPreset, custom: Option<SniperFilters>) -> Self {
        match preset {
            FilterPreset::Conservative => Self::conservative(),
            FilterPreset::Balanced => Self::balanced(),
            FilterPreset::Aggressive => Self::aggressive(),
            FilterPreset::Custom => custom.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationSeverity {
    Low,
    Medium,
    High,
}

impl fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationSeverity::Low => write!(f, "low"),
            ViolationSeverity::Medium => write!(f, "medium"),
            ViolationSeverity::High => write!(f, "high"),
        }
    }
}

/// One failed predicate, with what was expected and what was observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub filter: String,
    pub expected: String,
    pub actual: String,
    pub severity: ViolationSeverity,
    pub message: String,
}

impl Violation {
    fn new(
        filter: &str,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
        severity: ViolationSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            filter: filter.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
            severity,
            message: message.into(),
        }
    }
}

/// Structural validation outcome. Warnings are advisory only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Structurally validate a filter set: ranges, percentages and
/// min/max consistency. Does not touch the chain.
pub fn validate(filters: &SniperFilters) -> FilterValidation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let pct_fields = [
        ("maxTop10HolderPct", filters.max_top10_holder_pct),
        ("maxSingleHolderPct", filters.max_single_holder_pct),
        ("maxDevHoldingPct", filters.max_dev_holding_pct),
        ("maxBuyTaxPct", filters.max_buy_tax_pct),
        ("maxSellTaxPct", filters.max_sell_tax_pct),
        ("minPoolSupplyPct", filters.min_pool_supply_pct),
        ("maxPoolSupplyPct", filters.max_pool_supply_pct),
        ("maxRiskScore", filters.max_risk_score),
        ("minConfidence", filters.min_confidence),
        ("minLockPct", filters.min_lock_pct),
    ];
    for (name, value) in pct_fields {
        if let Some(v) = value {
            if !v.is_finite() || !(0.0..=100.0).contains(&v) {
                errors.push(format!("{name} must be within [0, 100], got {v}"));
            }
        }
    }

    if let (Some(min), Some(max)) = (
        filters.min_liquidity_lamports,
        filters.max_liquidity_lamports,
    ) {
        if min > max {
            errors.push(format!(
                "minLiquidity {min} exceeds maxLiquidity {max}"
            ));
        }
    }
    if let (Some(min), Some(max)) = (filters.min_pool_supply_pct, filters.max_pool_supply_pct) {
        if min > max {
            errors.push(format!(
                "minPoolSupplyPct {min} exceeds maxPoolSupplyPct {max}"
            ));
        }
    }

    if let Some(overlap) = filters
        .blacklist
        .intersection(&filters.whitelist)
        .next()
    {
        errors.push(format!("mint {overlap} is both blacklisted and whitelisted"));
    }

    if filters.max_sell_tax_pct.is_some_and(|v| v > 50.0) {
        warnings.push("maxSellTaxPct above 50% defeats honeypot protection".to_string());
    }
    if filters.max_risk_score.is_some_and(|v| v >= 90.0) {
        warnings.push("maxRiskScore of 90+ accepts nearly every token".to_string());
    }
    if filters.min_liquidity_lamports == Some(0) {
        warnings.push("minLiquidity of 0 accepts unfunded pools".to_string());
    }

    FilterValidation {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

/// On-chain auxiliary facts a filter check runs against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenFilterData {
    pub mint_authority_disabled: bool,
    pub freeze_authority_disabled: bool,
    pub liquidity_lamports: Option<u64>,
    pub lock_status: LockStatus,
    pub top10_holder_pct: Option<f64>,
    pub single_holder_pct: Option<f64>,
    pub dev_holding_pct: Option<f64>,
    pub holder_count: Option<u32>,
    pub buy_tax_pct: Option<f64>,
    pub sell_tax_pct: Option<f64>,
    pub pool_supply_pct: Option<f64>,
    pub has_metadata: bool,
    pub has_socials: bool,
    pub risk_score: f64,
    pub confidence: f64,
    pub sell_simulation_ok: Option<bool>,
}

impl TokenFilterData {
    /// Seed the observable facts from a honeypot result; liquidity,
    /// lock and holder data are filled in by the caller when available.
    pub fn from_honeypot(result: &HoneypotResult) -> Self {
        use crate::domain::honeypot::HoneypotFlag;
        Self {
            mint_authority_disabled: !result.has_flag(HoneypotFlag::MintAuthorityActive),
            freeze_authority_disabled: !result.has_flag(HoneypotFlag::FreezeAuthorityActive),
            liquidity_lamports: None,
            lock_status: LockStatus::Unknown,
            top10_holder_pct: None,
            single_holder_pct: None,
            dev_holding_pct: None,
            holder_count: None,
            buy_tax_pct: None,
            sell_tax_pct: None,
            pool_supply_pct: None,
            has_metadata: !result.has_flag(HoneypotFlag::MetadataMissing),
            has_socials: false,
            risk_score: result.risk_score,
            confidence: result.confidence,
            sell_simulation_ok: if result.has_flag(HoneypotFlag::SellSimulationFailed) {
                Some(false)
            } else {
                None
            },
        }
    }
}

/// Outcome of applying a filter set to one token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterCheck {
    pub passed: bool,
    pub violations: Vec<Violation>,
    pub token_data: TokenFilterData,
}

/// Apply the filter predicates. Pure: same inputs, same outcome.
///
/// Blacklisted mints short-circuit with a single high-severity
/// violation. Whitelisted mints bypass everything except the
/// honeypot-risk predicates.
pub fn check(mint: &Pubkey, data: &TokenFilterData, filters: &SniperFilters) -> FilterCheck {
    if filters.blacklist.contains(mint) {
        return FilterCheck {
            passed: false,
            violations: vec![Violation::new(
                "blacklist",
                "mint not blacklisted",
                mint.to_string(),
                ViolationSeverity::High,
                "mint is blacklisted",
            )],
            token_data: data.clone(),
        };
    }

    let whitelisted = filters.whitelist.contains(mint);
    let mut violations = Vec::new();

    // Honeypot-risk predicates apply even to whitelisted mints.
    if let Some(max) = filters.max_risk_score {
        if data.risk_score > max {
            violations.push(Violation::new(
                "maxRiskScore",
                format!("<= {max}"),
                format!("{:.1}", data.risk_score),
                ViolationSeverity::High,
                "honeypot risk score above limit",
            ));
        }
    }
    if let Some(min) = filters.min_confidence {
        if data.confidence < min {
            violations.push(Violation::new(
                "minConfidence",
                format!(">= {min}"),
                format!("{:.1}", data.confidence),
                ViolationSeverity::Medium,
                "honeypot confidence below floor",
            ));
        }
    }
    if filters.require_sell_simulation == Some(true) && data.sell_simulation_ok == Some(false) {
        violations.push(Violation::new(
            "requireSellSimulation",
            "sell simulation succeeds",
            "failed",
            ViolationSeverity::High,
            "simulated sell did not succeed",
        ));
    }

    if !whitelisted {
        if filters.require_mint_authority_disabled == Some(true) && !data.mint_authority_disabled {
            violations.push(Violation::new(
                "requireMintDisabled",
                "mint authority null",
                "present",
                ViolationSeverity::High,
                "mint authority is still active",
            ));
        }
        if filters.require_freeze_authority_disabled == Some(true)
            && !data.freeze_authority_disabled
        {
            violations.push(Violation::new(
                "requireFreezeDisabled",
                "freeze authority null",
                "present",
                ViolationSeverity::High,
                "freeze authority is still active",
            ));
        }

        if let (Some(min), Some(liq)) = (filters.min_liquidity_lamports, data.liquidity_lamports) {
            if liq < min {
                violations.push(Violation::new(
                    "minLiquidity",
                    format!(">= {min}"),
                    liq,
                    ViolationSeverity::High,
                    "initial liquidity below floor",
                ));
            }
        }
        if let (Some(max), Some(liq)) = (filters.max_liquidity_lamports, data.liquidity_lamports) {
            if liq > max {
                violations.push(Violation::new(
                    "maxLiquidity",
                    format!("<= {max}"),
                    liq,
                    ViolationSeverity::Low,
                    "initial liquidity above cap",
                ));
            }
        }

        if let Some(min_lock) = filters.min_lock_pct {
            // Unknown lock providers are not proof of an unlock.
            match data.lock_status {
                LockStatus::Locked { pct } if pct < min_lock => {
                    violations.push(Violation::new(
                        "minLockPct",
                        format!(">= {min_lock}"),
                        format!("{pct:.1}"),
                        ViolationSeverity::High,
                        "locked liquidity below floor",
                    ));
                }
                LockStatus::Unlocked => {
                    violations.push(Violation::new(
                        "minLockPct",
                        format!(">= {min_lock}"),
                        "unlocked",
                        ViolationSeverity::High,
                        "liquidity is not locked",
                    ));
                }
                _ => {}
            }
        }

        if let (Some(max), Some(pct)) = (filters.max_top10_holder_pct, data.top10_holder_pct) {
            if pct > max {
                violations.push(Violation::new(
                    "maxTop10HolderPct",
                    format!("<= {max}"),
                    format!("{pct:.1}"),
                    ViolationSeverity::Medium,
                    "top-10 holders own too much supply",
                ));
            }
        }
        if let (Some(max), Some(pct)) = (filters.max_single_holder_pct, data.single_holder_pct) {
            if pct > max {
                violations.push(Violation::new(
                    "maxSingleHolderPct",
                    format!("<= {max}"),
                    format!("{pct:.1}"),
                    ViolationSeverity::High,
                    "a single holder owns too much supply",
                ));
            }
        }
        if let (Some(max), Some(pct)) = (filters.max_dev_holding_pct, data.dev_holding_pct) {
            if pct > max {
                violations.push(Violation::new(
                    "maxDevHoldingPct",
                    format!("<= {max}"),
                    format!("{pct:.1}"),
                    ViolationSeverity::Medium,
                    "creator holding above cap",
                ));
            }
        }
        if let (Some(min), Some(count)) = (filters.min_holder_count, data.holder_count) {
            if count < min {
                violations.push(Violation::new(
                    "minHolderCount",
                    format!(">= {min}"),
                    count,
                    ViolationSeverity::Low,
                    "too few holders",
                ));
            }
        }

        if let (Some(max), Some(tax)) = (filters.max_buy_tax_pct, data.buy_tax_pct) {
            if tax > max {
                violations.push(Violation::new(
                    "maxBuyTaxPct",
                    format!("<= {max}"),
                    format!("{tax:.1}"),
                    ViolationSeverity::Medium,
                    "buy tax above cap",
                ));
            }
        }
        if let (Some(max), Some(tax)) = (filters.max_sell_tax_pct, data.sell_tax_pct) {
            if tax > max {
                violations.push(Violation::new(
                    "maxSellTaxPct",
                    format!("<= {max}"),
                    format!("{tax:.1}"),
                    ViolationSeverity::High,
                    "sell tax above cap",
                ));
            }
        }

        if let (Some(min), Some(pct)) = (filters.min_pool_supply_pct, data.pool_supply_pct) {
            if pct < min {
                violations.push(Violation::new(
                    "minPoolSupplyPct",
                    format!(">= {min}"),
                    format!("{pct:.1}"),
                    ViolationSeverity::Medium,
                    "pool holds too little of the supply",
                ));
            }
        }
        if let (Some(max), Some(pct)) = (filters.max_pool_supply_pct, data.pool_supply_pct) {
            if pct > max {
                violations.push(Violation::new(
                    "maxPoolSupplyPct",
                    format!("<= {max}"),
                    format!("{pct:.1}"),
                    ViolationSeverity::Low,
                    "pool holds too much of the supply",
                ));
            }
        }

        if filters.require_metadata == Some(true) && !data.has_metadata {
            violations.push(Violation::new(
                "requireMetadata",
                "metadata account exists",
                "missing",
                ViolationSeverity::Medium,
                "token has no metadata account",
            ));
        }
        if filters.require_socials == Some(true) && !data.has_socials {
            violations.push(Violation::new(
                "requireSocials",
                "social links present",
                "missing",
                ViolationSeverity::Low,
                "token metadata has no social links",
            ));
        }
    }

    FilterCheck {
        passed: violations.is_empty(),
        violations,
        token_data: data.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean_data() -> TokenFilterData {
        TokenFilterData {
            mint_authority_disabled: true,
            freeze_authority_disabled: true,
            liquidity_lamports: Some(50_000_000_000),
            lock_status: LockStatus::Locked { pct: 100.0 },
            top10_holder_pct: Some(45.0),
            single_holder_pct: Some(12.0),
            dev_holding_pct: Some(8.0),
            holder_count: Some(150),
            buy_tax_pct: Some(3.0),
            sell_tax_pct: Some(5.0),
            pool_supply_pct: Some(60.0),
            has_metadata: true,
            has_socials: true,
            risk_score: 20.0,
            confidence: 90.0,
            sell_simulation_ok: Some(true),
        }
    }

    #[test]
    fn test_clean_token_passes_conservative() {
        let mint = Pubkey::new_unique();
        let result = check(&mint, &clean_data(), &SniperFilters::conservative());
        assert!(result.passed, "violations: {:?}", result.violations);
    }

    #[test]
    fn test_active_mint_authority_fails_conservative() {
        let mint = Pubkey::new_unique();
        let mut data = clean_data();
        data.mint_authority_disabled = false;

        let result = check(&mint, &data, &SniperFilters::conservative());
        assert!(!result.passed);
        let v = &result.violations[0];
        assert_eq!(v.filter, "requireMintDisabled");
        assert_eq!(v.severity, ViolationSeverity::High);
    }

    #[test]
    fn test_blacklist_short_circuits() {
        let mint = Pubkey::new_unique();
        let mut filters = SniperFilters::aggressive();
        filters.blacklist.insert(mint);

        let mut data = clean_data();
        data.risk_score = 0.0;

        let result = check(&mint, &data, &filters);
        assert!(!result.passed);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].filter, "blacklist");
        assert_eq!(result.violations[0].severity, ViolationSeverity::High);
    }

    #[test]
    fn test_whitelist_bypasses_all_but_risk() {
        let mint = Pubkey::new_unique();
        let mut filters = SniperFilters::conservative();
        filters.whitelist.insert(mint);

        // Everything about this token is bad except the risk score.
        let mut data = clean_data();
        data.mint_authority_disabled = false;
        data.liquidity_lamports = Some(1);
        data.sell_tax_pct = Some(40.0);
        assert!(check(&mint, &data, &filters).passed);

        // But a high risk score still blocks a whitelisted mint.
        data.risk_score = 95.0;
        let result = check(&mint, &data, &filters);
        assert!(!result.passed);
        assert!(result
            .violations
            .iter()
            .all(|v| v.filter == "maxRiskScore"));
    }

    #[test]
    fn test_unknown_lock_is_not_unlocked() {
        let mint = Pubkey::new_unique();
        let mut data = clean_data();
        data.lock_status = LockStatus::Unknown;

        let result = check(&mint, &data, &SniperFilters::conservative());
        assert!(result.passed, "violations: {:?}", result.violations);

        data.lock_status = LockStatus::Unlocked;
        let result = check(&mint, &data, &SniperFilters::conservative());
        assert!(!result.passed);
    }

    #[test]
    fn test_absent_facts_pass_their_predicates() {
        let mint = Pubkey::new_unique();
        let mut data = clean_data();
        data.liquidity_lamports = None;
        data.top10_holder_pct = None;
        data.sell_tax_pct = None;

        let result = check(&mint, &data, &SniperFilters::conservative());
        assert!(result.passed, "violations: {:?}", result.violations);
    }

    #[test]
    fn test_validate_rejects_out_of_range_percentage() {
        let filters = SniperFilters {
            max_risk_score: Some(140.0),
            ..Default::default()
        };
        let v = validate(&filters);
        assert!(!v.valid);
        assert!(v.errors[0].contains("maxRiskScore"));
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let filters = SniperFilters {
            min_liquidity_lamports: Some(100),
            max_liquidity_lamports: Some(10),
            ..Default::default()
        };
        let v = validate(&filters);
        assert!(!v.valid);
    }

    #[test]
    fn test_validate_warns_on_extreme_thresholds() {
        let filters = SniperFilters {
            max_sell_tax_pct: Some(90.0),
            max_risk_score: Some(95.0),
            ..Default::default()
        };
        let v = validate(&filters);
        assert!(v.valid);
        assert_eq!(v.warnings.len(), 2);
    }

    #[test]
    fn test_validate_rejects_blacklist_whitelist_overlap() {
        let mint = Pubkey::new_unique();
        let mut filters = SniperFilters::default();
        filters.blacklist.insert(mint);
        filters.whitelist.insert(mint);
        assert!(!validate(&filters).valid);
    }
}

//! Alias grammar: parsing, validation and static-first resolution of
//! `[ticker:]alias[+tag]$domain` identifiers.

use crate::config::{AliasDomainConfig, Config, WalletAddressConfig};
use crate::error::{ResolverError, ResolverResult};
use crate::wallet::{DynamicAliasInput, WalletResolver};
use regex::Regex;
use std::sync::LazyLock;

static ALIAS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:([a-z0-9.-]+):)?([a-z0-9.-]+)(?:\+([a-z0-9.-]+))?\$([a-z0-9.-]+)$")
        .expect("alias pattern")
});

/// A fully resolved alias, ready to be signed.
#[derive(Debug, Clone)]
pub struct ResolvedAlias {
    pub alias: String,
    /// Empty if none.
    pub tag: String,
    pub domain: String,
    pub wallet: WalletAddressConfig,
}

/// Extract and validate the domain portion of an identifier without checking
/// whether the domain is configured.
pub fn parse_alias_domain(input: &str) -> ResolverResult<String> {
    let (_, _, _, domain) = parse_alias_parts(input)?;
    Ok(domain)
}

/// Extract the optional `ticker:` prefix of an identifier.
pub fn parse_ticker_prefix(input: &str) -> ResolverResult<Option<String>> {
    let (prefix, _, _, _) = parse_alias_parts(input)?;
    Ok(prefix)
}

/// Resolve only static mappings from config.
pub fn parse_alias(input: &str, ticker: &str, cfg: &Config) -> ResolverResult<ResolvedAlias> {
    let (mut alias, domain_cfg, ticker_clean) = parse_alias_identifier(input, ticker, cfg)?;
    match find_alias_wallet(domain_cfg, &alias.alias, &alias.tag, &ticker_clean) {
        Some(wallet) if !wallet.address.is_empty() => {
            alias.wallet = wallet;
            Ok(alias)
        }
        _ => Err(ResolverError::AliasNotFound),
    }
}

/// Resolve an identifier, preferring static mappings and falling back to the
/// dynamic wallet resolver. When a static alias exists but has no address,
/// its routing hints (account_index/account_id/wallet_id) are forwarded to
/// the wallet backend.
pub async fn resolve_alias(
    input: &str,
    ticker: &str,
    cfg: &Config,
    resolver: &WalletResolver,
    client_key: &str,
) -> ResolverResult<ResolvedAlias> {
    let (mut alias, domain_cfg, ticker_clean) = parse_alias_identifier(input, ticker, cfg)?;
    let static_entry = find_alias_wallet(domain_cfg, &alias.alias, &alias.tag, &ticker_clean);
    if let Some(wallet) = &static_entry {
        if !wallet.address.is_empty() {
            alias.wallet = wallet.clone();
            return Ok(alias);
        }
    }

    let mut input = DynamicAliasInput {
        ticker: ticker_clean.clone(),
        alias: alias.alias.clone(),
        tag: alias.tag.clone(),
        domain: alias.domain.clone(),
        ..Default::default()
    };
    if let Some(wallet) = static_entry {
        input.account_index = wallet.account_index;
        input.account_id = wallet.account_id;
        input.wallet_id = wallet.wallet_id;
    }

    let address = resolver.resolve(cfg, &input, client_key).await?;
    alias.wallet = WalletAddressConfig {
        ticker: ticker_clean,
        address,
        ..Default::default()
    };
    Ok(alias)
}

fn parse_alias_identifier<'a>(
    input: &str,
    ticker: &str,
    cfg: &'a Config,
) -> ResolverResult<(ResolvedAlias, &'a AliasDomainConfig, String)> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ResolverError::InvalidAlias("empty identifier".to_string()));
    }

    let ticker_clean = ticker.trim().to_lowercase();
    if ticker_clean.is_empty() {
        return Err(ResolverError::InvalidAlias("empty ticker".to_string()));
    }

    let (prefix, alias_name, tag, domain) = parse_alias_parts(input)?;
    if let Some(prefix) = prefix {
        if prefix != ticker_clean {
            return Err(ResolverError::TickerMismatch(format!(
                "prefix {prefix:?} does not match {ticker_clean:?}"
            )));
        }
    }

    let alias = ResolvedAlias {
        alias: alias_name,
        tag,
        domain,
        wallet: WalletAddressConfig::default(),
    };

    let domain_cfg = cfg
        .domains
        .iter()
        .find(|d| d.domain == alias.domain)
        .ok_or(ResolverError::AliasNotFound)?;

    Ok((alias, domain_cfg, ticker_clean))
}

/// Split an identifier into `(ticker_prefix, alias, tag, domain)`. The tag is
/// empty when absent.
fn parse_alias_parts(input: &str) -> ResolverResult<(Option<String>, String, String, String)> {
    let input = input.trim().to_lowercase();
    if input.is_empty() {
        return Err(ResolverError::InvalidAlias("empty identifier".to_string()));
    }
    let caps = ALIAS_PATTERN.captures(&input).ok_or_else(|| {
        ResolverError::InvalidAlias(
            "invalid format (expected [ticker:]alias[+tag]$domain)".to_string(),
        )
    })?;

    let prefix = caps.get(1).map(|m| m.as_str().to_string());
    let alias = caps[2].to_string();
    let tag = caps.get(3).map(|m| m.as_str().to_string()).unwrap_or_default();
    let domain = caps[4].to_string();

    if let Some(prefix) = &prefix {
        validate_field(prefix, "ticker")?;
    }
    validate_field(&alias, "alias")?;
    if !tag.is_empty() {
        validate_field(&tag, "tag")?;
    }
    if domain.contains("..") {
        return Err(ResolverError::InvalidAlias(
            "domain must not contain consecutive dots".to_string(),
        ));
    }

    Ok((prefix, alias, tag, domain))
}

fn validate_field(s: &str, field: &str) -> ResolverResult<()> {
    let is_alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let bytes = s.as_bytes();
    if bytes.is_empty() {
        return Err(ResolverError::InvalidAlias(format!("{field} is empty")));
    }
    if !is_alnum(bytes[0]) || !is_alnum(bytes[bytes.len() - 1]) {
        return Err(ResolverError::InvalidAlias(format!(
            "{field} must start and end with a letter or digit"
        )));
    }
    if s.contains("..") {
        return Err(ResolverError::InvalidAlias(format!(
            "{field} must not contain consecutive dots"
        )));
    }
    Ok(())
}

/// Search a domain's static alias table. Tag children are preferred; the root
/// wallet is a fallback when its ticker matches.
fn find_alias_wallet(
    domain_cfg: &AliasDomainConfig,
    alias_name: &str,
    tag: &str,
    ticker: &str,
) -> Option<WalletAddressConfig> {
    for alias in &domain_cfg.aliases {
        if alias.alias != alias_name {
            continue;
        }
        for t in &alias.tags {
            if t.tag == tag && t.wallet.ticker == ticker {
                return Some(t.wallet.clone());
            }
        }
        if alias.wallet.ticker == ticker {
            return Some(alias.wallet.clone());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_config, WalletAlias, WalletTag};

    fn cfg_with_aliases() -> Config {
        let mut cfg = default_config();
        cfg.domains[0].aliases = vec![WalletAlias {
            alias: "demo".to_string(),
            wallet: WalletAddressConfig {
                ticker: "xmr".to_string(),
                address: "addr-root".to_string(),
                ..Default::default()
            },
            tags: vec![WalletTag {
                tag: "tip".to_string(),
                wallet: WalletAddressConfig {
                    ticker: "xmr".to_string(),
                    address: "addr-tag".to_string(),
                    ..Default::default()
                },
            }],
        }];
        cfg.normalize();
        cfg
    }

    #[test]
    fn test_parse_static_root() {
        let cfg = cfg_with_aliases();
        let alias = parse_alias("demo$127.0.0.1", "xmr", &cfg).unwrap();
        assert_eq!(alias.alias, "demo");
        assert_eq!(alias.tag, "");
        assert_eq!(alias.domain, "127.0.0.1");
        assert_eq!(alias.wallet.address, "addr-root");
    }

    #[test]
    fn test_parse_static_tag() {
        let cfg = cfg_with_aliases();
        let alias = parse_alias("demo+tip$127.0.0.1", "xmr", &cfg).unwrap();
        assert_eq!(alias.tag, "tip");
        assert_eq!(alias.wallet.address, "addr-tag");
    }

    #[test]
    fn test_unknown_tag_falls_back_to_root() {
        let cfg = cfg_with_aliases();
        let alias = parse_alias("demo+other$127.0.0.1", "xmr", &cfg).unwrap();
        assert_eq!(alias.wallet.address, "addr-root");
    }

    #[test]
    fn test_input_is_trimmed_and_lowercased() {
        let cfg = cfg_with_aliases();
        let alias = parse_alias("  DEMO$127.0.0.1 ", "XMR", &cfg).unwrap();
        assert_eq!(alias.wallet.address, "addr-root");
    }

    #[test]
    fn test_ticker_prefix_must_match() {
        let cfg = cfg_with_aliases();
        let alias = parse_alias("xmr:demo$127.0.0.1", "xmr", &cfg).unwrap();
        assert_eq!(alias.wallet.address, "addr-root");

        let err = parse_alias("btc:demo$127.0.0.1", "xmr", &cfg).unwrap_err();
        assert!(matches!(err, ResolverError::TickerMismatch(_)));
    }

    #[test]
    fn test_unconfigured_domain_is_not_found() {
        let cfg = cfg_with_aliases();
        let err = parse_alias("demo$elsewhere.example", "xmr", &cfg).unwrap_err();
        assert!(matches!(err, ResolverError::AliasNotFound));
    }

    #[test]
    fn test_unknown_alias_is_not_found() {
        let cfg = cfg_with_aliases();
        let err = parse_alias("ghost$127.0.0.1", "xmr", &cfg).unwrap_err();
        assert!(matches!(err, ResolverError::AliasNotFound));
    }

    #[test]
    fn test_wrong_ticker_is_not_found() {
        let cfg = cfg_with_aliases();
        let err = parse_alias("demo$127.0.0.1", "btc", &cfg).unwrap_err();
        assert!(matches!(err, ResolverError::AliasNotFound));
    }

    #[test]
    fn test_invalid_identifiers_rejected() {
        let cfg = cfg_with_aliases();
        for bad in [
            "",
            "demo",
            "demo$",
            "$127.0.0.1",
            "-demo$127.0.0.1",
            "demo-$127.0.0.1",
            "de..mo$127.0.0.1",
            "demo+$127.0.0.1",
            "demo+-x$127.0.0.1",
            "demo$do..main",
            "de mo$127.0.0.1",
        ] {
            let err = parse_alias(bad, "xmr", &cfg).unwrap_err();
            assert!(
                matches!(err, ResolverError::InvalidAlias(_)),
                "{bad:?} should be invalid, got {err:?}"
            );
        }
    }

    #[test]
    fn test_empty_ticker_rejected() {
        let cfg = cfg_with_aliases();
        let err = parse_alias("demo$127.0.0.1", " ", &cfg).unwrap_err();
        assert!(matches!(err, ResolverError::InvalidAlias(_)));
    }

    #[test]
    fn test_parse_alias_domain() {
        assert_eq!(
            parse_alias_domain("xmr:demo+tip$example.com").unwrap(),
            "example.com"
        );
        assert!(parse_alias_domain("nodomain").is_err());
    }

    #[test]
    fn test_parse_ticker_prefix() {
        assert_eq!(
            parse_ticker_prefix("xmr:demo$example.com").unwrap(),
            Some("xmr".to_string())
        );
        assert_eq!(parse_ticker_prefix("demo$example.com").unwrap(), None);
        assert!(parse_ticker_prefix("demo").is_err());
    }
}

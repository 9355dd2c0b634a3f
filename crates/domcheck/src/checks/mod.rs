//! Domain validation predicates.
//!
//! [`Checks`] bundles every check selected on the command line into one
//! [`Predicate`] for the broker. Checks run in a fixed order (TLS, CNAME,
//! IP range) and stop at the first failure. Every failure, including a
//! network error, counts as "invalid".
//!
//! ## Structure
//!
//! - [`tls`] - TLS handshake on port 443.
//! - [`cname`] - canonical name match.
//! - [`cidr`] - resolved addresses inside allowed networks.

pub mod cidr;
pub mod cname;
pub mod tls;

use crate::config::CheckConfig;
use cidr::Cidr;
use domcheck_broker::Predicate;
use hickory_resolver::TokioAsyncResolver;
use tls::TlsCheck;

/// The composite check applied to every domain.
pub struct Checks {
    tls: Option<TlsCheck>,
    cname: Option<String>,
    cidrs: Vec<Cidr>,
    resolver: Option<TokioAsyncResolver>,
}

impl Checks {
    /// Builds the checks selected in `config`.
    ///
    /// The DNS resolver is only created when a DNS-based check is selected.
    pub fn new(config: &CheckConfig) -> anyhow::Result<Self> {
        let tls = config.tls.then(|| TlsCheck::new(config.timeout)).transpose()?;

        let needs_dns = config.cname.is_some() || !config.cidrs.is_empty();
        let resolver = if needs_dns {
            let (resolver_config, mut opts) = hickory_resolver::system_conf::read_system_conf()
                .unwrap_or_else(|_e| {
                    tracing::warn!("Falling back to default resolver config: {_e}");
                    Default::default()
                });
            opts.timeout = config.timeout;
            Some(TokioAsyncResolver::tokio(resolver_config, opts))
        } else {
            None
        };

        if config.is_empty() {
            tracing::warn!("No check selected; every domain will be reported valid");
        }

        Ok(Self {
            tls,
            cname: config.cname.clone(),
            cidrs: config.cidrs.clone(),
            resolver,
        })
    }

    async fn validate(&self, domain: &str) -> bool {
        if let Some(tls) = &self.tls {
            let tls = tls.clone();
            let owned = domain.to_owned();
            let ok = tokio::task::spawn_blocking(move || tls.check_blocking(&owned))
                .await
                .unwrap_or_else(|e| {
                    if e.is_panic() {
                        std::panic::resume_unwind(e.into_panic());
                    }
                    false
                });
            if !ok {
                return false;
            }
        }

        if let (Some(expected), Some(resolver)) = (&self.cname, &self.resolver) {
            if !cname::check_cname(resolver, domain, expected).await {
                return false;
            }
        }

        if !self.cidrs.is_empty() {
            if let Some(resolver) = &self.resolver {
                if !cidr::check_cidr(resolver, domain, &self.cidrs).await {
                    return false;
                }
            }
        }

        true
    }
}

impl Predicate<String> for Checks {
    async fn check(&self, key: &String) -> bool {
        let valid = self.validate(key).await;
        if valid {
            tracing::debug!("{key} is valid");
        } else {
            tracing::debug!("{key} is invalid");
        }
        valid
    }
}

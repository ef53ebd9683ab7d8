//! Header Rule Engine (spec.md §4.D): applies a group's set/remove header
//! rules, with variable interpolation, after channel-specific modification.
//! Grounded on `auth_extractor::set_header`'s convention (every provider in
//! `gproxy-provider-impl` mutates a `Headers` vec with a set/get/remove
//! helper trio) — `relay-provider-core::headers` keeps that helper, and
//! this crate adds the interpolation layer spec.md §4.D names on top of it.

use std::time::SystemTime;

use relay_provider_core::{HeaderRule, HeaderRuleAction, Headers, header_remove, header_set};

/// Values available for `${TOKEN}` interpolation in a rule's value template
/// (spec.md §4.D).
pub struct InterpolationContext<'a> {
    pub client_ip: &'a str,
    pub group_name: &'a str,
    pub api_key: &'a str,
    pub now: SystemTime,
}

/// Applies `rules` to `headers` in order. Unknown `${TOKEN}` sequences are
/// left as literal text rather than erroring.
pub fn apply_header_rules(headers: &mut Headers, rules: &[HeaderRule], ctx: &InterpolationContext) {
    for rule in rules {
        match rule.action {
            HeaderRuleAction::Remove => {
                header_remove(headers, &rule.name);
            }
            HeaderRuleAction::Set => {
                let value = interpolate(&rule.value_template, ctx);
                header_set(headers, rule.name.clone(), value);
            }
        }
    }
}

fn interpolate(template: &str, ctx: &InterpolationContext) -> String {
    let since_epoch = ctx
        .now
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();

    template
        .replace("${CLIENT_IP}", ctx.client_ip)
        .replace("${GROUP_NAME}", ctx.group_name)
        .replace("${API_KEY}", ctx.api_key)
        .replace("${TIMESTAMP_MS}", &since_epoch.as_millis().to_string())
        .replace("${TIMESTAMP_S}", &since_epoch.as_secs().to_string())
}

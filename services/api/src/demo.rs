use crate::infra::MemoryStores;
use clap::Args;
use consent_ledger::consent::{
    AcceptanceMethod, CaptureContext, CreateConsentRequest, CreateLinkRequest,
    CreatePolicyRequest, DomainError, LinkSettings, NewPolicyVersion, PolicyConsentStatus,
    PolicySelection, ServiceError, TenantId, MAX_LINK_EXPIRY_HOURS, MIN_LINK_EXPIRY_HOURS,
};
use consent_ledger::error::AppError;

const DEMO_TENANT: &str = "demo-tenant";
const DEMO_BASE_URL: &str = "http://localhost:3000";

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Subject identifier used throughout the walkthrough
    #[arg(long, default_value = "demo-user")]
    pub(crate) subject: String,
    /// Lifetime of the demo consent link, in hours
    #[arg(
        long,
        default_value_t = 1,
        value_parser = clap::value_parser!(u32).range(i64::from(MIN_LINK_EXPIRY_HOURS)..=i64::from(MAX_LINK_EXPIRY_HOURS))
    )]
    pub(crate) link_hours: u32,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        subject,
        link_hours,
    } = args;
    let tenant = TenantId::new(DEMO_TENANT);
    let stores = MemoryStores::default();
    let api = stores.api(LinkSettings::new(DEMO_BASE_URL, link_hours));

    println!("Consent ledger demo (tenant {tenant}, subject {subject})");

    for (slug, name) in [
        ("privacy", "Privacy Policy"),
        ("terms", "Terms of Service"),
        ("cookies", "Cookie Policy"),
    ] {
        api.policies.create_policy(
            &tenant,
            CreatePolicyRequest {
                slug: slug.to_string(),
                name: name.to_string(),
                description: format!("{name} for the demo tenant"),
            },
        )?;
    }
    api.policies
        .add_version(&tenant, "privacy", demo_version("1.0").active())?;
    api.policies
        .add_version(&tenant, "terms", demo_version("1.0").active())?;
    api.policies
        .add_version(&tenant, "cookies", demo_version("0.1-draft"))?;
    println!("- Published privacy 1.0 and terms 1.0; cookies has only an inactive draft");

    println!("\nDirect consent");
    let recorded = api.consents.create_consents(
        &tenant,
        CreateConsentRequest {
            subject: subject.clone(),
            policies: vec![
                PolicySelection::current("privacy"),
                PolicySelection::current("terms"),
            ],
            capture: Some(CaptureContext {
                ip_address: Some("198.51.100.7".to_string()),
                user_agent: Some("consent-ledger-demo".to_string()),
            }),
        },
        AcceptanceMethod::Direct,
        None,
    )?;
    for consent in &recorded {
        println!(
            "  - {} accepted {}@{} ({})",
            consent.subject,
            consent.policy_slug,
            consent.policy_version,
            consent.acceptance_method.label()
        );
    }
    print_status(&api.consents.consent_status(&tenant, &subject, &[])?);

    println!("\nPrivacy 1.1 published without re-acceptance");
    api.policies
        .add_version(&tenant, "privacy", demo_version("1.1").active())?;
    print_status(&api.consents.consent_status(&tenant, &subject, &[])?);

    println!("\nTerms 2.0 published requiring re-acceptance");
    api.policies.add_version(
        &tenant,
        "terms",
        demo_version("2.0").active().requiring_re_acceptance(),
    )?;
    print_status(&api.consents.consent_status(&tenant, &subject, &[])?);

    println!("\nConsent link for the outdated terms ({link_hours}h)");
    let created = api.links.create_link(
        &tenant,
        CreateLinkRequest {
            subject: subject.clone(),
            policies: vec!["terms".to_string()],
            expires_in_hours: None,
            created_by: "demo".to_string(),
        },
    )?;
    println!("  - {} (expires {})", created.url, created.expires_at);
    let info = api.links.get_link_info(&created.token)?;
    for policy in &info.policies {
        println!("  - link presents {} {}", policy.name, policy.version);
    }

    let link = api.links.mark_link_as_used(&created.token)?;
    let via_link = api.consents.create_consents_from_link(&link, None)?;
    for consent in &via_link {
        println!(
            "  - {} accepted {}@{} ({})",
            consent.subject,
            consent.policy_slug,
            consent.policy_version,
            consent.acceptance_method.label()
        );
    }
    match api.links.mark_link_as_used(&created.token) {
        Err(ServiceError::Domain(DomainError::LinkAlreadyUsed)) => {
            println!("  - second use rejected: link already used")
        }
        Ok(_) => println!("  - unexpected: link accepted twice"),
        Err(err) => println!("  - second use failed: {err}"),
    }
    print_status(&api.consents.consent_status(&tenant, &subject, &[])?);

    println!("\nRevocation");
    let privacy = api
        .consents
        .active_consent_by_subject_and_policy(&tenant, &subject, "privacy")?;
    let revoked = api.consents.revoke_consent(&tenant, &privacy.id, &subject)?;
    if let Some(revocation) = revoked.revocation() {
        println!(
            "  - privacy consent {} revoked by {} at {}",
            revoked.id, revocation.revoked_by, revocation.revoked_at
        );
    }
    print_status(&api.consents.consent_status(&tenant, &subject, &[])?);

    let history = api.consents.consents_by_subject(&tenant, &subject)?;
    println!(
        "\nConsent history: {} records for {}",
        history.consents.len(),
        history.subject
    );
    match serde_json::to_string_pretty(&history) {
        Ok(json) => println!("{json}"),
        Err(err) => println!("  history payload unavailable: {err}"),
    }

    Ok(())
}

fn demo_version(label: &str) -> NewPolicyVersion {
    NewPolicyVersion {
        content_markdown: format!("# Version {label}\n\nDemo policy text."),
        ..NewPolicyVersion::new(label)
    }
}

fn print_status(statuses: &[PolicyConsentStatus]) {
    println!("  Status:");
    for status in statuses {
        match &status.consented_version {
            Some(consented) => println!(
                "    - {}: {} (consented {}, active {})",
                status.slug,
                status.status.label(),
                consented,
                status.active_version
            ),
            None => println!(
                "    - {}: {} (active {})",
                status.slug,
                status.status.label(),
                status.active_version
            ),
        }
    }
}

//! Per-channel rendering of plans and direct responses.
//!
//! This is the only place that branches on channel. Every renderer skips
//! sections that are missing or empty and never fails.

use serde::Serialize;

use crate::llm::Intent;
use crate::pipeline::plan::{ActionPlan, PlanStep};
use crate::store::{Channel, Domain};

/// Hard ceiling for a rendered SMS plan, in characters.
pub const SMS_MAX_CHARS: usize = 300;

const SMS_MAX_ACTIONS: usize = 3;
const SMS_MAX_DOCUMENTS: usize = 2;
const WHATSAPP_MAX_STEPS: usize = 5;
const WHATSAPP_MAX_RESOURCES: usize = 3;
const WHATSAPP_MAX_ALERTS: usize = 2;
const VOICE_MAX_RESOURCES: usize = 2;

/// Structured reply returned to web clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebReply {
    pub text: String,
    pub language: String,
    pub intent: Intent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_plan: Option<ActionPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_guide: Option<IconGuide>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IconGuide {
    pub steps: Vec<IconStep>,
    pub summary_icon: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IconStep {
    pub step_number: u32,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub icon: &'static str,
}

/// Output of a render: the text body plus, for web, the structured object.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub text: String,
    pub web: Option<WebReply>,
}

impl Rendered {
    fn text(text: String) -> Self {
        Self { text, web: None }
    }
}

/// Inputs the web renderer needs beyond the plan or text itself.
#[derive(Debug, Clone)]
pub struct RenderContext<'a> {
    pub language: &'a str,
    pub intent: &'a Intent,
    /// File name of synthesized audio, if any.
    pub audio_file: Option<&'a str>,
}

pub fn render_plan(
    channel: Channel,
    plan: &ActionPlan,
    domain: Domain,
    ctx: &RenderContext<'_>,
) -> Rendered {
    match channel {
        Channel::Sms => Rendered::text(format_sms(plan)),
        Channel::Whatsapp => Rendered::text(format_whatsapp(plan)),
        Channel::Voice => Rendered::text(format_voice(plan)),
        Channel::Web => {
            let text = plan
                .summary
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "Here is your action plan.".to_string());
            let web = WebReply {
                text: text.clone(),
                language: ctx.language.to_string(),
                intent: ctx.intent.clone(),
                action_plan: Some(plan.clone()),
                visual_guide: Some(icon_guide(plan, domain)),
                audio_url: ctx.audio_file.map(audio_url),
            };
            Rendered {
                text,
                web: Some(web),
            }
        }
    }
}

pub fn render_response(channel: Channel, text: &str, ctx: &RenderContext<'_>) -> Rendered {
    match channel {
        Channel::Sms | Channel::Whatsapp => Rendered::text(text.to_string()),
        Channel::Voice => Rendered::text(strip_markup(text)),
        Channel::Web => Rendered {
            text: text.to_string(),
            web: Some(WebReply {
                text: text.to_string(),
                language: ctx.language.to_string(),
                intent: ctx.intent.clone(),
                action_plan: None,
                visual_guide: None,
                audio_url: ctx.audio_file.map(audio_url),
            }),
        },
    }
}

pub fn audio_url(file: &str) -> String {
    format!("/audio/{file}")
}

pub fn format_sms(plan: &ActionPlan) -> String {
    let mut out = String::new();
    if let Some(summary) = non_empty(&plan.summary) {
        out.push_str(summary);
        out.push_str("\n\n");
    }

    if !plan.immediate_actions.is_empty() {
        out.push_str("Quick Steps:\n");
        for (i, action) in plan.immediate_actions.iter().take(SMS_MAX_ACTIONS).enumerate() {
            out.push_str(&format!("{}. {action}\n", i + 1));
        }
    }

    if !plan.documents_required.is_empty() {
        let docs: Vec<&str> = plan
            .documents_required
            .iter()
            .take(SMS_MAX_DOCUMENTS)
            .map(String::as_str)
            .collect();
        out.push_str(&format!("\nDocuments needed: {}", docs.join(", ")));
    }

    truncate_chars(out.trim_end(), SMS_MAX_CHARS)
}

pub fn format_whatsapp(plan: &ActionPlan) -> String {
    let mut out = String::from("*📋 Your Action Plan*\n\n");
    if let Some(summary) = non_empty(&plan.summary) {
        out.push_str(summary);
        out.push_str("\n\n");
    }

    if !plan.immediate_actions.is_empty() {
        out.push_str("*⚡ Immediate Actions:*\n");
        for action in &plan.immediate_actions {
            out.push_str(&format!("• {action}\n"));
        }
        out.push('\n');
    }

    if !plan.steps.is_empty() {
        out.push_str("*📝 Step-by-Step Guide:*\n\n");
        for (n, step) in plan.numbered_steps().take(WHATSAPP_MAX_STEPS) {
            out.push_str(&format!("*{n}.* {}\n", step.action));
            if let Some(details) = non_empty(&step.details) {
                out.push_str(&format!("   _{details}_\n"));
            }
            out.push('\n');
        }
    }

    if !plan.documents_required.is_empty() {
        out.push_str("*📄 Required Documents:*\n");
        for doc in &plan.documents_required {
            out.push_str(&format!("• {doc}\n"));
        }
        out.push('\n');
    }

    if !plan.resources.is_empty() {
        out.push_str("*📞 Help & Resources:*\n");
        for resource in plan.resources.iter().take(WHATSAPP_MAX_RESOURCES) {
            let name = non_empty(&resource.name).unwrap_or("Resource");
            out.push_str(&format!("• *{name}*"));
            if let Some(contact) = non_empty(&resource.contact) {
                out.push_str(&format!(": {contact}"));
            }
            out.push('\n');
        }
        out.push('\n');
    }

    if !plan.risk_alerts.is_empty() {
        out.push_str("*⚠️ Important Alerts:*\n");
        for alert in plan.risk_alerts.iter().take(WHATSAPP_MAX_ALERTS) {
            out.push_str(&format!("• {alert}\n"));
        }
        out.push('\n');
    }

    if let Some(time) = non_empty(&plan.estimated_time) {
        out.push_str(&format!("*⏱️ Estimated Time:* {time}\n"));
    }

    out.trim_end().to_string()
}

/// Flat narration, one line per step.
pub fn format_voice(plan: &ActionPlan) -> String {
    let mut lines: Vec<String> = Vec::new();
    if let Some(summary) = non_empty(&plan.summary) {
        lines.push(strip_markup(summary));
    }

    if !plan.steps.is_empty() {
        lines.push("Here are the steps you need to follow.".to_string());
        for (n, step) in plan.numbered_steps() {
            lines.push(voice_step(n, step));
        }
    }

    if !plan.documents_required.is_empty() {
        let docs: Vec<String> = plan
            .documents_required
            .iter()
            .map(|d| strip_markup(d))
            .collect();
        lines.push(format!(
            "You will need the following documents: {}.",
            docs.join(", ")
        ));
    }

    let resources: Vec<String> = plan
        .resources
        .iter()
        .take(VOICE_MAX_RESOURCES)
        .filter_map(|r| {
            let name = non_empty(&r.name)?;
            let name = strip_markup(name);
            Some(match non_empty(&r.contact) {
                Some(contact) => format!("{name}: {}.", strip_markup(contact)),
                None => format!("{name}."),
            })
        })
        .collect();
    if !resources.is_empty() {
        lines.push(format!("For help, you can contact {}", resources.join(" ")));
    }

    lines.join("\n")
}

fn voice_step(n: u32, step: &PlanStep) -> String {
    let action = strip_markup(step.action.trim_end_matches('.'));
    match non_empty(&step.details) {
        Some(details) => format!(
            "Step {n}: {action}. {}.",
            strip_markup(details.trim_end_matches('.'))
        ),
        None => format!("Step {n}: {action}."),
    }
}

/// Keyword-derived icon per step plus a domain icon for the summary.
pub fn icon_guide(plan: &ActionPlan, domain: Domain) -> IconGuide {
    IconGuide {
        steps: plan
            .numbered_steps()
            .map(|(n, step)| IconStep {
                step_number: n,
                action: step.action.clone(),
                details: step.details.clone(),
                icon: step_icon(&step.action),
            })
            .collect(),
        summary_icon: domain_icon(domain),
    }
}

fn step_icon(action: &str) -> &'static str {
    let action = action.to_lowercase();
    if action.contains("document") || action.contains("paper") {
        "📄"
    } else if action.contains("visit") || action.contains("go to") {
        "📍"
    } else if action.contains("call") || action.contains("contact") {
        "📞"
    } else if action.contains("pay") || action.contains("money") {
        "💰"
    } else {
        "📌"
    }
}

pub fn domain_icon(domain: Domain) -> &'static str {
    match domain {
        Domain::Health => "🏥",
        Domain::Agriculture => "🌾",
        Domain::Finance => "💰",
        Domain::Education => "📚",
        Domain::GovernmentSchemes => "🏛️",
        Domain::Climate => "🌍",
        Domain::General => "ℹ️",
    }
}

/// Remove markdown emphasis and fold line breaks so text reads cleanly aloud.
pub fn strip_markup(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '*' | '_' | '#' | '`' | '~'))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max - 3).collect();
    out.push_str("...");
    out
}

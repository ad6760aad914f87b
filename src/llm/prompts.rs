//! Prompt templates for the AI collaborator.

use crate::llm::{Intent, PromptContext};
use crate::store::{LiteracyLevel, Role};

/// Earlier turns included in response prompts.
pub const HISTORY_TURNS: usize = 6;

pub const INTENT_PREAMBLE: &str = "You classify messages sent to SahaayAI, an assistant that \
helps underserved communities in India reach essential services. Reply with a single JSON \
object and nothing else.";

pub const PLAN_PREAMBLE: &str = "You are SahaayAI, an assistant helping underserved communities \
access essential services. You write practical action plans in simple language. Reply with a \
single JSON object and nothing else.";

pub const SIMPLIFY_PREAMBLE: &str = "You rewrite text so that it is easier to read. Keep every \
fact, drop nothing important, and reply with the rewritten text only.";

fn literacy_guidance(level: LiteracyLevel) -> &'static str {
    match level {
        LiteracyLevel::Low => {
            "Use very simple language, short sentences, avoid technical terms. Explain everything step-by-step."
        }
        LiteracyLevel::Medium => {
            "Use clear language, moderate complexity, explain technical terms when used."
        }
        LiteracyLevel::High => {
            "Use standard language, can include technical information with proper context."
        }
    }
}

fn simplify_guidance(level: LiteracyLevel) -> &'static str {
    match level {
        LiteracyLevel::Low => {
            "Use very simple words, short sentences (5-8 words), explain everything like teaching a beginner. Use analogies and examples."
        }
        LiteracyLevel::Medium => {
            "Use common words, moderate sentence length (8-15 words), some technical terms with brief explanations."
        }
        LiteracyLevel::High => "Use standard language, can include technical terms with context.",
    }
}

pub fn intent_prompt(text: &str, language: &str) -> String {
    format!(
        r#"Analyze the following user message and extract:
1. Primary intent (what the user wants to do)
2. Domain (health/agriculture/finance/education/government_schemes/climate/general)
3. Key entities (location, dates, amounts, etc.)
4. Urgency level (low/medium/high)

Message language: {language}
User message: {text}

Respond in JSON format:
{{"intent": "string", "domain": "string", "entities": {{}}, "urgency": "string", "confidence": 0.0}}"#
    )
}

/// System preamble for conversational replies.
pub fn response_preamble(context: &PromptContext) -> String {
    format!(
        "You are SahaayAI, a compassionate assistant helping underserved communities access \
essential services like healthcare, government schemes, financial literacy, agriculture \
support, and education.

User profile:
- Language: {language}
- Literacy level: {literacy}
- Location: {location}
- Channel: {channel}

Guidelines:
- {guidance}
- Be empathetic, patient, and respectful.
- Give actionable, practical advice with clear next steps.
- Ask a clarifying question when the request is ambiguous.
- Put the user's safety first and mention local resources when you can.
- Reply in the user's language.

Start by acknowledging the concern, use numbered steps for instructions, and end by asking \
whether they need more help. Keep it concise.",
        language = context.language,
        literacy = context.literacy.as_str(),
        location = context.location.as_deref().unwrap_or("Not specified"),
        channel = context.channel,
        guidance = literacy_guidance(context.literacy),
    )
}

pub fn response_prompt(text: &str, intent: &Intent, context: &PromptContext) -> String {
    let mut prompt = String::new();

    let start = context.history.len().saturating_sub(HISTORY_TURNS);
    let recent = &context.history[start..];
    if !recent.is_empty() {
        prompt.push_str("Earlier in this conversation:\n");
        for turn in recent {
            let speaker = match turn.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            prompt.push_str(&format!("{speaker}: {}\n", turn.text));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "Detected intent: {} (domain: {}, urgency: {})\n\nUser query: {text}",
        intent.intent, intent.domain, intent.urgency
    ));
    prompt
}

pub fn plan_prompt(text: &str, intent: &Intent, context: &PromptContext) -> String {
    format!(
        r#"Domain: {domain}
Entities: {entities}
Location: {location}
User query: {text}
Language: {language}

Generate a detailed action plan with:
1. Immediate actions (what to do now)
2. Required documents
3. Eligibility criteria
4. Step-by-step instructions (simple language)
5. Risk alerts or warnings
6. Contact information or resources

Respond in JSON format:
{{
  "summary": "Brief summary of the situation",
  "immediate_actions": ["action1", "action2"],
  "steps": [{{"step_number": 1, "action": "description", "details": "additional info"}}],
  "documents_required": ["document1", "document2"],
  "eligibility": {{"criteria": ["criterion1"], "status": "eligible/not_eligible/check_needed"}},
  "risk_alerts": ["alert1"],
  "resources": [{{"name": "resource", "contact": "info"}}],
  "estimated_time": "time estimate"
}}

Keep language simple and appropriate for {literacy} literacy level."#,
        domain = intent.domain,
        entities = intent.entities,
        location = context.location.as_deref().unwrap_or("Not specified"),
        language = context.language,
        literacy = context.literacy.as_str(),
    )
}

pub fn simplify_prompt(text: &str, literacy: LiteracyLevel, language: &str) -> String {
    format!(
        "Simplify the following text for someone with {level} literacy level.\n\n\
Guidelines: {guidance}\nTarget language: {language}\n\nOriginal text:\n{text}\n\nSimplified version:",
        level = literacy.as_str(),
        guidance = simplify_guidance(literacy),
    )
}

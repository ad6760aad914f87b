//! TwiML documents returned to Twilio webhooks.

pub const CONTENT_TYPE: &str = "application/xml";

pub const GATHER_ACTION: &str = "/api/v1/voice/gather";

const VOICE: &str = "alice";

/// Accumulates verbs inside a `<Response>` element.
#[derive(Debug, Default)]
pub struct Twiml {
    body: String,
}

impl Twiml {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, text: &str) -> Self {
        self.body
            .push_str(&format!("<Message>{}</Message>", escape_xml(text)));
        self
    }

    pub fn say(mut self, text: &str, language: &str) -> Self {
        self.body.push_str(&say_element(text, language));
        self
    }

    /// Speech `<Gather>` posting back to the gather endpoint, with a prompt.
    pub fn gather_speech(mut self, prompt: &str, language: &str) -> Self {
        self.body.push_str(&format!(
            r#"<Gather input="speech" action="{GATHER_ACTION}" method="POST" speechTimeout="auto" language="{lang}">{say}</Gather>"#,
            lang = voice_locale(language),
            say = say_element(prompt, language),
        ));
        self
    }

    pub fn build(self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><Response>{}</Response>"#,
            self.body
        )
    }
}

fn say_element(text: &str, language: &str) -> String {
    format!(
        r#"<Say voice="{VOICE}" language="{}">{}</Say>"#,
        voice_locale(language),
        escape_xml(text)
    )
}

/// Twilio locale for a language code.
pub fn voice_locale(language: &str) -> &'static str {
    match language {
        "hi" => "hi-IN",
        "ta" => "ta-IN",
        "te" => "te-IN",
        "bn" => "bn-IN",
        "mr" => "mr-IN",
        "gu" => "gu-IN",
        "kn" => "kn-IN",
        "ml" => "ml-IN",
        "pa" => "pa-IN",
        _ => "en-US",
    }
}

pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_is_escaped() {
        let xml = Twiml::new().message("Fish & <chips>").build();
        assert_eq!(
            xml,
            r#"<?xml version="1.0" encoding="UTF-8"?><Response><Message>Fish &amp; &lt;chips&gt;</Message></Response>"#
        );
    }

    #[test]
    fn gather_wraps_prompt() {
        let xml = Twiml::new()
            .say("Hello", "hi")
            .gather_speech("Anything else?", "en")
            .build();
        assert!(xml.contains(r#"<Say voice="alice" language="hi-IN">Hello</Say>"#));
        assert!(xml.contains(r#"action="/api/v1/voice/gather""#));
        assert!(xml.contains(r#"<Say voice="alice" language="en-US">Anything else?</Say></Gather>"#));
    }
}

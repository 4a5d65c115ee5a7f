//! Structured markdown rendering of protocol documents.
//!
//! Layout:
//!
//! ```text
//! # {name}
//! Protocol ID: {id}
//!
//! ## Description
//! ## Trigger Reason
//! ## Steps
//! ## Resolution Options
//! ## Notes
//! ```
//!
//! Steps are written as `{code}. {text}`, ascending by code, one per line.
//! Empty sections get a fixed placeholder line that the parser maps back to
//! an empty value.

use smartvoz_core::error::{Result, SmartvozError};
use smartvoz_core::types::{Protocol, ProtocolStep, Reason};

const ID_PREFIX: &str = "Protocol ID:";

const NO_DESCRIPTION: &str = "No description recorded.";
const NO_REASON: &str = "No trigger reason recorded.";
const NO_STEPS: &str = "No steps recorded.";
const NO_OPTIONS: &str = "No resolution options recorded.";
const NO_NOTES: &str = "None.";

const DESCRIPTION: &str = "Description";
const TRIGGER_REASON: &str = "Trigger Reason";
const STEPS: &str = "Steps";
const RESOLUTION_OPTIONS: &str = "Resolution Options";
const NOTES: &str = "Notes";

fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        placeholder
    } else {
        trimmed
    }
}

/// Render a protocol as structured markdown.
pub fn render_protocol(protocol: &Protocol) -> String {
    let mut steps = protocol.steps.clone();
    steps.sort_by_key(|s| s.code);

    let reason = match &protocol.reason {
        Some(r) => format!(
            "Code: {}\nName: {}\nDescription: {}",
            r.code.trim(),
            r.name.trim(),
            r.description.trim()
        ),
        None => NO_REASON.to_string(),
    };

    let steps = if steps.is_empty() {
        NO_STEPS.to_string()
    } else {
        steps
            .iter()
            .map(|s| format!("{}. {}", s.code, s.text.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let options = if protocol.resolution_options.is_empty() {
        NO_OPTIONS.to_string()
    } else {
        protocol
            .resolution_options
            .iter()
            .map(|o| format!("- {}", o.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "# {name}\n{ID_PREFIX} {id}\n\n## {DESCRIPTION}\n{description}\n\n## {TRIGGER_REASON}\n{reason}\n\n## {STEPS}\n{steps}\n\n## {RESOLUTION_OPTIONS}\n{options}\n\n## {NOTES}\n{notes}\n",
        name = protocol.name.trim(),
        id = protocol.id,
        description = or_placeholder(&protocol.description, NO_DESCRIPTION),
        notes = or_placeholder(&protocol.notes, NO_NOTES),
    )
}

/// Parse a protocol document produced by [`render_protocol`].
///
/// `fallback_id` is used when the document has no `Protocol ID:` line,
/// typically the id taken from the file name.
pub fn parse_protocol(content: &str, fallback_id: &str) -> Result<Protocol> {
    let mut name: Option<String> = None;
    let mut id: Option<String> = None;
    let mut sections: Vec<(String, Vec<&str>)> = Vec::new();

    for line in content.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            sections.push((heading.trim().to_string(), Vec::new()));
        } else if let Some(title) = line.strip_prefix("# ") {
            name = Some(title.trim().to_string());
        } else if let Some((_, body)) = sections.last_mut() {
            body.push(line);
        } else if let Some(rest) = line.strip_prefix(ID_PREFIX) {
            id = Some(rest.trim().to_string());
        }
    }

    let name = name.ok_or_else(|| {
        SmartvozError::Serialization(format!("protocol {} has no title line", fallback_id))
    })?;

    let section = |title: &str| -> String {
        sections
            .iter()
            .find(|(h, _)| h == title)
            .map(|(_, body)| body.join("\n").trim().to_string())
            .unwrap_or_default()
    };
    let clear = |value: String, placeholder: &str| {
        if value == placeholder {
            String::new()
        } else {
            value
        }
    };

    let reason_text = clear(section(TRIGGER_REASON), NO_REASON);
    let reason = if reason_text.is_empty() {
        None
    } else {
        let mut reason = Reason::default();
        for line in reason_text.lines() {
            if let Some(v) = line.strip_prefix("Code:") {
                reason.code = v.trim().to_string();
            } else if let Some(v) = line.strip_prefix("Name:") {
                reason.name = v.trim().to_string();
            } else if let Some(v) = line.strip_prefix("Description:") {
                reason.description = v.trim().to_string();
            }
        }
        Some(reason)
    };

    let mut steps = Vec::new();
    for line in clear(section(STEPS), NO_STEPS).lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (code, text) = line.split_once(". ").ok_or_else(|| {
            SmartvozError::Serialization(format!("malformed protocol step: {:?}", line))
        })?;
        let code = code.trim().parse::<u32>().map_err(|e| {
            SmartvozError::Serialization(format!("malformed protocol step code {:?}: {}", code, e))
        })?;
        steps.push(ProtocolStep {
            code,
            text: text.trim().to_string(),
        });
    }

    let resolution_options = clear(section(RESOLUTION_OPTIONS), NO_OPTIONS)
        .lines()
        .map(|l| l.trim().trim_start_matches("- ").trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();

    let mut protocol = Protocol {
        id: id.unwrap_or_else(|| fallback_id.to_string()),
        name,
        description: clear(section(DESCRIPTION), NO_DESCRIPTION),
        reason,
        steps,
        resolution_options,
        notes: clear(section(NOTES), NO_NOTES),
    };
    protocol.sort_steps();
    Ok(protocol)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router_protocol() -> Protocol {
        Protocol {
            id: "1".to_string(),
            name: "Sin conexion a internet".to_string(),
            description: "El router no enciende la luz de red".to_string(),
            reason: Some(Reason {
                id: "r1".to_string(),
                code: "NET-01".to_string(),
                name: "Falla de conectividad".to_string(),
                description: "Perdida total del servicio".to_string(),
            }),
            steps: vec![
                ProtocolStep { code: 20, text: "Apagar el router".to_string() },
                ProtocolStep { code: 10, text: "Verificar el enchufe".to_string() },
                ProtocolStep { code: 30, text: "Encender el router".to_string() },
            ],
            resolution_options: vec!["Agendar visita tecnica".to_string()],
            notes: String::new(),
        }
    }

    #[test]
    fn test_render_has_sections_and_sorted_steps() {
        let text = render_protocol(&router_protocol());
        assert!(text.starts_with("# Sin conexion a internet\nProtocol ID: 1\n"));
        for heading in [
            "## Description",
            "## Trigger Reason",
            "## Steps",
            "## Resolution Options",
            "## Notes",
        ] {
            assert!(text.contains(heading), "missing {}", heading);
        }
        assert!(text.contains(
            "## Steps\n10. Verificar el enchufe\n20. Apagar el router\n30. Encender el router\n"
        ));
        assert!(text.contains("## Notes\nNone.\n"));
    }

    #[test]
    fn test_parse_recovers_fields() {
        let original = router_protocol();
        let parsed = parse_protocol(&render_protocol(&original), "ignored").unwrap();

        assert_eq!(parsed.id, "1");
        assert_eq!(parsed.name, original.name);
        assert_eq!(parsed.description, original.description);
        let codes: Vec<u32> = parsed.steps.iter().map(|s| s.code).collect();
        assert_eq!(codes, vec![10, 20, 30]);
        let reason = parsed.reason.unwrap();
        assert_eq!(reason.code, "NET-01");
        assert_eq!(reason.name, "Falla de conectividad");
        assert_eq!(parsed.resolution_options, original.resolution_options);
        assert!(parsed.notes.is_empty());
    }

    #[test]
    fn test_placeholders_for_empty_sections() {
        let protocol = Protocol {
            id: "9".to_string(),
            name: "Cambio de clave".to_string(),
            ..Default::default()
        };
        let text = render_protocol(&protocol);
        assert!(text.contains(NO_DESCRIPTION));
        assert!(text.contains(NO_REASON));
        assert!(text.contains(NO_STEPS));
        assert!(text.contains(NO_OPTIONS));

        let parsed = parse_protocol(&text, "9").unwrap();
        assert!(parsed.reason.is_none());
        assert!(parsed.steps.is_empty());
        assert!(parsed.resolution_options.is_empty());
        assert!(parsed.description.is_empty());
    }

    #[test]
    fn test_parse_uses_fallback_id() {
        let parsed = parse_protocol("# Envio demorado\n\n## Steps\n1. Pedir codigo\n", "7").unwrap();
        assert_eq!(parsed.id, "7");
        assert_eq!(parsed.steps.len(), 1);
    }

    #[test]
    fn test_parse_rejects_untitled_document() {
        assert!(parse_protocol("## Steps\n1. a\n", "1").is_err());
    }

    #[test]
    fn test_parse_rejects_malformed_step() {
        let err = parse_protocol("# X\n## Steps\nfirst do this\n", "1").unwrap_err();
        assert_eq!(err.kind(), "SerializationError");
    }
}

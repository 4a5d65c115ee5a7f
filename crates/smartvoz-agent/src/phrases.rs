//! Caller-facing phrases. Spanish is the deployment language.
//!
//! Nothing in this module may carry internal error detail; failures are
//! always phrased as "service unavailable" or "no verified information".

use smartvoz_core::types::Protocol;

pub fn greeting(agent_name: &str) -> String {
    format!(
        "Hola, Soy un Agente de IA de {}. ¿Cuál es su nombre y la empresa a la que pertenece?",
        agent_name
    )
}

pub const ASK_IDENTITY: &str =
    "Para ayudarle necesito su nombre completo y la empresa a la que pertenece.";

pub fn validated(name: &str) -> String {
    format!("Gracias, {}. {}", name, ASK_ISSUE)
}

pub const ASK_ISSUE: &str = "¿En qué puedo ayudarle hoy?";

pub const ASK_ISSUE_AGAIN: &str = "¿Podría describirme el problema que tiene?";

pub const UNKNOWN_RETRY: &str = "No pude identificarle como usuario registrado de una empresa válida. \
¿Podría repetirme su nombre completo y la empresa a la que pertenece?";

pub const UNKNOWN_FINAL: &str = "Lo siento, no pude identificarle como usuario registrado de una \
empresa válida, por lo que no puedo brindarle información. Por favor, confirme sus datos con su empresa.";

pub const SERVICE_UNAVAILABLE: &str =
    "Lo siento, el servicio no está disponible temporalmente. Por favor, intente nuevamente en unos minutos.";

pub const OFF_TOPIC: &str =
    "Lo siento, solo puedo ayudarle con temas relacionados con usted, su empresa y su consulta de soporte.";

pub const ASK_CONFIRMATION: &str = "¿Esto resolvió su problema?";

pub const CONFIRMATION_UNCLEAR: &str =
    "Disculpe, ¿pudo resolver su problema? Por favor responda sí o no.";

pub const RESOLVED_VERIFIED: &str = "Qué bueno haberle ayudado.";

pub const RESOLVED_GENERATED: &str = "Me alegra que haya podido resolver su problema.";

pub const TRANSFER_OFFER: &str = "¿Desea ser transferido a una persona real para que le ayude?";

pub const CALL_ENDED: &str = "La llamada ya finalizó. Gracias por comunicarse.";

/// Present a protocol as spoken instructions built from its ordered steps.
pub fn protocol_solution(protocol: &Protocol) -> String {
    let mut out = format!(
        "Encontré una solución verificada para su caso: {}.",
        trim_sentence(&protocol.name)
    );

    let steps: Vec<String> = protocol
        .steps
        .iter()
        .map(|s| lower_first(trim_sentence(&s.text)))
        .filter(|s| !s.is_empty())
        .collect();
    match steps.len() {
        0 => {}
        1 => out.push_str(&format!(" Le recomiendo {}.", steps[0])),
        n => {
            let mut parts = vec![format!("primero, {}", steps[0])];
            for step in &steps[1..n - 1] {
                parts.push(format!("luego, {}", step));
            }
            parts.push(format!("y finalmente, {}", steps[n - 1]));
            out.push_str(&format!(" Siga estos pasos: {}.", parts.join("; ")));
        }
    }

    if !protocol.resolution_options.is_empty() {
        let options: Vec<String> = protocol
            .resolution_options
            .iter()
            .map(|o| lower_first(trim_sentence(o)))
            .collect();
        out.push_str(&format!(
            " Si el problema continúa, también podemos: {}.",
            options.join(", o ")
        ));
    }

    out.push(' ');
    out.push_str(ASK_CONFIRMATION);
    out
}

pub const GENERIC_SUGGESTION: &str =
    "le sugiero reiniciar el equipo o servicio afectado y verificar su configuración.";

/// Suggestion pointing at the caller's own services related to the issue.
pub fn service_hint(services: &[String]) -> String {
    let names = match services {
        [] => return GENERIC_SUGGESTION.to_string(),
        [one] => one.clone(),
        [init @ .., last] => format!("{} y {}", init.join(", "), last),
    };
    format!(
        "le sugiero revisar la configuración de su servicio {} y reiniciar el equipo asociado.",
        names
    )
}

/// Present a generated answer, disclosing that it is not verified. An
/// empty answer falls back to [`GENERIC_SUGGESTION`].
pub fn generated_solution(answer: &str) -> String {
    let answer = answer.trim();
    let suggestion = if answer.is_empty() {
        GENERIC_SUGGESTION.to_string()
    } else {
        answer.to_string()
    };
    format!(
        "No encontré una solución verificada para su caso. Le comparto una sugerencia generada \
         automáticamente, que no está verificada: {} {}",
        suggestion, ASK_CONFIRMATION
    )
}

pub fn escalation() -> String {
    format!("Lamento que no se haya resuelto. {}", TRANSFER_OFFER)
}

fn trim_sentence(s: &str) -> &str {
    s.trim().trim_end_matches(['.', ';', ',']).trim()
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartvoz_core::types::ProtocolStep;

    fn protocol(steps: &[&str]) -> Protocol {
        Protocol {
            id: "1".into(),
            name: "Sin conexion a internet".into(),
            steps: steps
                .iter()
                .enumerate()
                .map(|(i, t)| ProtocolStep {
                    code: (i as u32 + 1) * 10,
                    text: t.to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_greeting() {
        assert_eq!(
            greeting("SmartVoz"),
            "Hola, Soy un Agente de IA de SmartVoz. ¿Cuál es su nombre y la empresa a la que pertenece?"
        );
    }

    #[test]
    fn test_protocol_solution_is_synthesized_from_steps() {
        let text = protocol_solution(&protocol(&[
            "Reiniciar el router.",
            "Revisar los cables.",
            "Probar con otro dispositivo.",
        ]));
        assert_eq!(
            text,
            "Encontré una solución verificada para su caso: Sin conexion a internet. Siga estos \
             pasos: primero, reiniciar el router; luego, revisar los cables; y finalmente, probar \
             con otro dispositivo. ¿Esto resolvió su problema?"
        );
    }

    #[test]
    fn test_protocol_solution_single_step_and_options() {
        let mut p = protocol(&["Reiniciar el router."]);
        p.resolution_options = vec!["Enviar un técnico".into(), "Cambiar el equipo".into()];
        let text = protocol_solution(&p);
        assert!(text.contains("Le recomiendo reiniciar el router."));
        assert!(text.contains("también podemos: enviar un técnico, o cambiar el equipo."));
    }

    #[test]
    fn test_generated_solution_discloses() {
        let text = generated_solution("Revise la configuración del módem.");
        assert!(text.contains("no está verificada"));
        assert!(text.ends_with(ASK_CONFIRMATION));
    }

    #[test]
    fn test_service_hint_lists_services() {
        let one = service_hint(&["Portal web".to_string()]);
        assert!(one.contains("su servicio Portal web y"));
        let two = service_hint(&["Portal web".to_string(), "Correo".to_string()]);
        assert!(two.contains("Portal web y Correo"));
        assert_eq!(service_hint(&[]), GENERIC_SUGGESTION);
    }

    #[test]
    fn test_escalation_offers_transfer() {
        assert!(escalation().ends_with(TRANSFER_OFFER));
    }
}

//! Plain-text conversation summary.

use chrono::SecondsFormat;

use coach_core::Turn;

pub fn render_subject(brand: &str, reason: &str) -> String {
    format!("Resumen {brand} ({reason})")
}

/// One line per turn: `[<RFC3339>] <ROLE>: <content>`.
pub fn render_body(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| {
            format!(
                "[{}] {}: {}",
                t.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                t.role.as_str().to_uppercase(),
                t.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use coach_core::Role;

    #[test]
    fn subject_names_brand_and_reason() {
        assert_eq!(render_subject("SALVA.COACH", "auto-inactivity"), "Resumen SALVA.COACH (auto-inactivity)");
    }

    #[test]
    fn body_has_one_line_per_turn() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
        let turns = vec![
            Turn { role: Role::User, content: "Hola, quiero mejorar mi FTP".into(), timestamp: ts },
            Turn { role: Role::Assistant, content: "Te propongo el Pack 1 a 1".into(), timestamp: ts },
        ];
        let body = render_body(&turns);
        assert_eq!(
            body,
            "[2025-03-01T09:30:00.000Z] USER: Hola, quiero mejorar mi FTP\n\
             [2025-03-01T09:30:00.000Z] ASSISTANT: Te propongo el Pack 1 a 1"
        );
    }

    #[test]
    fn empty_transcript_renders_empty() {
        assert!(render_body(&[]).is_empty());
    }
}

//! Prompt assembly and reference file loading
//!
//! Reference files are read once at engine construction, under hard caps on
//! count, per-file size, and aggregate size. The checks are fail-closed: a
//! file that is missing, unreadable, or over a cap aborts construction
//! before any transport call is made.

use crate::engine::EngineError;
use conclave_domain::{DiscussionSettings, Message, ModeKind, Participant};
use std::path::PathBuf;

pub(crate) struct ReferenceFile {
    pub path: PathBuf,
    pub content: String,
}

pub(crate) fn load_reference_files(
    settings: &DiscussionSettings,
) -> Result<Vec<ReferenceFile>, EngineError> {
    let limits = &settings.sandbox;
    if settings.reference_files.len() > limits.max_files {
        return Err(EngineError::ReferenceFilesTooMany {
            count: settings.reference_files.len(),
            max: limits.max_files,
        });
    }

    let mut files = Vec::with_capacity(settings.reference_files.len());
    let mut total: u64 = 0;
    for path in &settings.reference_files {
        let metadata = std::fs::metadata(path).map_err(|source| EngineError::ReferenceFileRead {
            path: path.clone(),
            source,
        })?;
        let size = metadata.len();
        if size > limits.max_file_bytes {
            return Err(EngineError::ReferenceFileTooLarge {
                path: path.clone(),
                size,
                max: limits.max_file_bytes,
            });
        }
        total += size;
        if total > limits.max_total_bytes {
            return Err(EngineError::ReferenceFilesTotalTooLarge {
                total,
                max: limits.max_total_bytes,
            });
        }
        let content =
            std::fs::read_to_string(path).map_err(|source| EngineError::ReferenceFileRead {
                path: path.clone(),
                source,
            })?;
        files.push(ReferenceFile {
            path: path.clone(),
            content,
        });
    }
    Ok(files)
}

/// Background block shared by every participant's first-round prompt
pub(crate) fn base_context(settings: &DiscussionSettings, files: &[ReferenceFile]) -> String {
    let mut out = String::from("[Discussion background]\n");
    out.push_str(&format!("Topic: {}\n", settings.topic));
    if let Some(extra) = &settings.extra_context {
        out.push_str(&format!("Additional context: {extra}\n"));
    }

    if !settings.participants.is_empty() {
        out.push_str("\n[Participants]\n");
        for p in &settings.participants {
            let role = p
                .role
                .as_deref()
                .map(|r| format!(" | role={r}"))
                .unwrap_or_default();
            out.push_str(&format!("- @{} | agent={}{}\n", p.name, p.agent_kind, role));
        }
    }

    if !files.is_empty() {
        out.push_str("\n[Reference files]\n");
        for file in files {
            out.push_str(&format!(
                "\n--- {} ---\n{}\n",
                file.path.display(),
                file.content
            ));
        }
    }
    out
}

pub(crate) fn speaker_prompt(
    participant: &Participant,
    role_text: &str,
    topic: &str,
    context: &str,
    mode: ModeKind,
) -> String {
    let instruction = match mode {
        ModeKind::Collaborative => {
            "Build on your responsibility: extend or refine the plan with concrete interfaces, steps, risks, and mitigations."
        }
        ModeKind::Debate => {
            "Argue from your responsibility: state your position and respond to the other participants (rebut or reinforce)."
        }
    };
    format!(
        "# Task: multi-agent group discussion\n\
         You are @{name}\n\
         agent kind: {kind}\n\
         Responsibility: {role_text}\n\
         \n\
         Topic: {topic}\n\
         \n\
         ## History\n\
         {context}\n\
         \n\
         ## Your task\n\
         1. {instruction}\n\
         2. Keep it concise, under 200 words.\n",
        name = participant.name,
        kind = participant.agent_kind,
    )
}

/// Digest sent to the transcript mirror after a round, best effort
pub(crate) fn round_digest(round: u32, messages: &[Message]) -> String {
    let mut out = format!("Transcript of round {round} (record only, no reply expected):\n");
    for m in messages.iter().filter(|m| m.round == round) {
        out.push_str(&format!("@{}: {}\n", m.agent, m.content));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_domain::SandboxLimits;
    use std::io::Write;
    use tempfile::TempDir;

    fn settings_with_files(paths: Vec<PathBuf>, sandbox: SandboxLimits) -> DiscussionSettings {
        let mut s = DiscussionSettings::new(
            "topic",
            vec![Participant::new("A", "advocate").with_role("argues for")],
        );
        s.reference_files = paths;
        s.sandbox = sandbox;
        s
    }

    fn write_file(dir: &TempDir, name: &str, bytes: usize) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&vec![b'x'; bytes]).unwrap();
        path
    }

    #[test]
    fn test_reference_files_loaded_within_limits() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "notes.md", 100);
        let s = settings_with_files(vec![path], SandboxLimits::default());
        let files = load_reference_files(&s).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].content.len(), 100);
    }

    #[test]
    fn test_too_many_files_rejected() {
        let dir = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..3)
            .map(|i| write_file(&dir, &format!("f{i}.md"), 10))
            .collect();
        let s = settings_with_files(
            paths,
            SandboxLimits {
                max_files: 2,
                ..Default::default()
            },
        );
        assert!(matches!(
            load_reference_files(&s),
            Err(EngineError::ReferenceFilesTooMany { count: 3, max: 2 })
        ));
    }

    #[test]
    fn test_oversized_file_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "big.md", 600);
        let s = settings_with_files(
            vec![path],
            SandboxLimits {
                max_file_bytes: 500,
                ..Default::default()
            },
        );
        assert!(matches!(
            load_reference_files(&s),
            Err(EngineError::ReferenceFileTooLarge { size: 600, .. })
        ));
    }

    #[test]
    fn test_aggregate_cap_rejected() {
        let dir = TempDir::new().unwrap();
        let paths = vec![
            write_file(&dir, "a.md", 400),
            write_file(&dir, "b.md", 400),
        ];
        let s = settings_with_files(
            paths,
            SandboxLimits {
                max_file_bytes: 500,
                max_total_bytes: 700,
                ..Default::default()
            },
        );
        assert!(matches!(
            load_reference_files(&s),
            Err(EngineError::ReferenceFilesTotalTooLarge { total: 800, .. })
        ));
    }

    #[test]
    fn test_missing_file_fails_closed() {
        let s = settings_with_files(
            vec![PathBuf::from("/nonexistent/readme.md")],
            SandboxLimits::default(),
        );
        assert!(matches!(
            load_reference_files(&s),
            Err(EngineError::ReferenceFileRead { .. })
        ));
    }

    #[test]
    fn test_base_context_lists_participants_and_files() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "design-notes.md", 5);
        let mut s = settings_with_files(vec![path], SandboxLimits::default());
        s.extra_context = Some("greenfield service".into());
        let files = load_reference_files(&s).unwrap();
        let ctx = base_context(&s, &files);
        assert!(ctx.contains("Topic: topic"));
        assert!(ctx.contains("Additional context: greenfield service"));
        assert!(ctx.contains("- @A | agent=advocate | role=argues for"));
        assert!(ctx.contains("design-notes.md"));
    }

    #[test]
    fn test_speaker_prompt_varies_by_mode() {
        let p = Participant::new("A", "advocate");
        let debate = speaker_prompt(&p, "argues", "t", "ctx", ModeKind::Debate);
        let collab = speaker_prompt(&p, "argues", "t", "ctx", ModeKind::Collaborative);
        assert!(debate.contains("rebut or reinforce"));
        assert!(collab.contains("risks, and mitigations"));
        assert!(debate.contains("You are @A"));
    }

    #[test]
    fn test_round_digest_only_includes_that_round() {
        let messages = vec![
            Message::new("A", "old", 1),
            Message::new("B", "new", 2),
        ];
        let digest = round_digest(2, &messages);
        assert!(digest.contains("@B: new"));
        assert!(!digest.contains("@A: old"));
    }
}

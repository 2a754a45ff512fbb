//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use distill_core::{OperationType, QuizConfig};

#[derive(Parser, Debug)]
#[command(name = "distill")]
#[command(about = "Summaries, key points, key terms and quizzes from documents with a local model")]
pub struct Cli {
    /// Data directory (default: ~/.local/share/distill)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one generation job and stream its events to stdout as JSON lines
    Generate(GenerateArgs),
    /// Extract text from documents, one at a time
    Parse {
        /// PDF or text files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Show the generation settings, or update them
    Config {
        #[arg(long)]
        endpoint: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// summary, key_points, key_terms or quiz
    pub operation: OperationType,

    /// Text file holding the document
    pub file: PathBuf,

    #[arg(long, default_value_t = 1)]
    pub document_id: i64,

    /// Model server endpoint, overriding settings.json
    #[arg(long, env = "DISTILL_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Model name, overriding settings.json
    #[arg(long, env = "DISTILL_MODEL")]
    pub model: Option<String>,

    /// Number of quiz questions
    #[arg(long)]
    pub questions: Option<u32>,

    /// Comma-separated quiz question types
    #[arg(long)]
    pub types: Option<String>,

    /// Quiz difficulty
    #[arg(long)]
    pub difficulty: Option<String>,
}

impl GenerateArgs {
    /// Quiz configuration from the flags, defaults for anything unset
    pub fn quiz_config(&self) -> QuizConfig {
        let defaults = QuizConfig::default();
        QuizConfig {
            question_count: self.questions.unwrap_or(defaults.question_count),
            question_types: self.types.clone().unwrap_or(defaults.question_types),
            difficulty: self.difficulty.clone().unwrap_or(defaults.difficulty),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generate_quiz() {
        let cli = Cli::try_parse_from([
            "distill",
            "generate",
            "quiz",
            "notes.txt",
            "--questions",
            "3",
            "--types",
            "true_false",
        ])
        .unwrap();

        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.operation, OperationType::Quiz);
        assert_eq!(args.document_id, 1);

        let quiz = args.quiz_config();
        assert_eq!(quiz.question_count, 3);
        assert_eq!(quiz.question_types, "true_false");
        assert_eq!(quiz.difficulty, "medium");
    }

    #[test]
    fn test_unknown_operation_rejected() {
        assert!(Cli::try_parse_from(["distill", "generate", "outline", "notes.txt"]).is_err());
    }

    #[test]
    fn test_parse_requires_files() {
        assert!(Cli::try_parse_from(["distill", "parse"]).is_err());
    }
}

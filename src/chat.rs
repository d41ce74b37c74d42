//! Interactive Portuguese chat loop.
//!
//! Reads from any [`AsyncBufRead`] and writes to any [`Write`], so the loop
//! is driven by stdin/stdout in the binary and by byte buffers in tests.
//! The pipelines sit behind [`ChatBackend`].

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::config::{process_env, Config};
use crate::error::RagError;
use crate::ingest::{run_ingest, IngestReport};
use crate::search::{run_answer, Answer};

pub const BANNER_WIDTH: usize = 60;
pub const FAREWELL: &str = "Encerrando o chat. Até logo!";
pub const INTERRUPTED: &str = "Chat interrompido pelo usuário. Até logo!";

const MODEL_PROMPT: &str = "\n*ATENÇÃO: caso o documento já tenha sido processado por outro modelo, \
utilize o mesmo modelo para continuar a conversa.* \n\nDeseja utilizar OPENAI ou GEMINI? ";
const INGEST_PROMPT: &str = "\n*ATENÇÃO: caso o documento já tenha sido processado por outro modelo, \
será necessário processar o documento novamente.* \n\n\
Deseja processar o arquivo document.pdf antes de iniciar? (sim/não): ";
const QUESTION_PROMPT: &str = "\n[FAÇA SUA PERGUNTA]: ";

const AFFIRMATIVE: [&str; 4] = ["sim", "s", "yes", "y"];
const EXIT_WORDS: [&str; 3] = ["sair", "exit", "quit"];

/// What the chat loop needs from the pipelines.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn ingest(&self, model_choice: &str) -> Result<IngestReport, RagError>;
    async fn ask(&self, question: &str, model_choice: &str) -> Result<Answer, RagError>;
}

/// Backend reading credentials from the process environment.
pub struct EnvBackend {
    config: Config,
    base_dir: PathBuf,
}

impl EnvBackend {
    pub fn new(config: Config, base_dir: PathBuf) -> Self {
        Self { config, base_dir }
    }
}

#[async_trait]
impl ChatBackend for EnvBackend {
    async fn ingest(&self, model_choice: &str) -> Result<IngestReport, RagError> {
        run_ingest(model_choice, &self.config, process_env, &self.base_dir, false).await
    }

    async fn ask(&self, question: &str, model_choice: &str) -> Result<Answer, RagError> {
        run_answer(question, model_choice, &self.config, process_env).await
    }
}

/// Print `prompt`, then read one line. `None` at end of input.
async fn prompt_line<R, W>(input: &mut R, out: &mut W, prompt: &str) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    write!(out, "{}", prompt)?;
    out.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Run one chat session until the user leaves or input ends.
///
/// The model choice is not validated up front; an invalid choice surfaces
/// as an error on every question.
pub async fn run_chat<R, W>(backend: &dyn ChatBackend, mut input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let rule = "=".repeat(BANNER_WIDTH);
    writeln!(out, "{}", rule)?;
    writeln!(out, "BEM-VINDO AO CHAT RAG")?;
    writeln!(out, "{}", rule)?;

    let Some(model) = prompt_line(&mut input, out, MODEL_PROMPT).await? else {
        writeln!(out, "\n{}", FAREWELL)?;
        return Ok(());
    };
    let model = model.to_lowercase();

    let Some(process) = prompt_line(&mut input, out, INGEST_PROMPT).await? else {
        writeln!(out, "\n{}", FAREWELL)?;
        return Ok(());
    };

    if AFFIRMATIVE.contains(&process.to_lowercase().as_str()) {
        writeln!(out, "\n[PROCESSANDO O PDF...]")?;
        match backend.ingest(&model).await {
            Ok(report) => {
                tracing::info!(chunks = report.chunks, "ingested from chat");
                writeln!(out, "[SUCESSO] Documento processado e armazenado com sucesso!")?;
            }
            Err(e) => {
                writeln!(out, "\n[ERRO AO PROCESSAR]: {}", e)?;
                // Chat ingestion never deletes rows; switching models is explicit
                if matches!(e, RagError::ProviderMismatch { .. }) {
                    writeln!(
                        out,
                        "Para reprocessar o documento com este modelo, execute: rag ingest {} --reset",
                        model
                    )?;
                }
                writeln!(
                    out,
                    "Você ainda pode continuar e fazer perguntas se o documento já foi processado anteriormente.\n"
                )?;
            }
        }
    }

    writeln!(out, "\nDigite 'sair' ou 'exit' para encerrar o chat.\n")?;

    loop {
        let question = match prompt_line(&mut input, out, QUESTION_PROMPT).await? {
            Some(q) => q,
            None => {
                writeln!(out, "\n{}", FAREWELL)?;
                break;
            }
        };

        if question.is_empty() || EXIT_WORDS.contains(&question.to_lowercase().as_str()) {
            writeln!(out, "\n{}", FAREWELL)?;
            break;
        }

        writeln!(out, "\n[PROCESSANDO...]")?;
        match backend.ask(&question, &model).await {
            Ok(answer) => writeln!(out, "\n[RESPOSTA]: {}", answer.text)?,
            Err(e) => {
                writeln!(out, "\n[ERRO]: {}", e)?;
                writeln!(out, "Tente novamente ou digite 'sair' para encerrar.")?;
            }
        }
    }

    Ok(())
}

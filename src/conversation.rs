//! The conversation loop: input, chat reply, spoken reply
//!
//! Each turn reads one input, asks the chat model for a reply, prints it and
//! plays it through the [`Speaker`]. Ctrl-C ends the loop between turns or
//! cuts off the current one.

use std::io::Write;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::Result;
use crate::audio::{AudioBackend, Interrupt, Speaker};
use crate::chat::{ChatModel, FALLBACK_REPLY};
use crate::voice::{Heard, Listener, Synthesizer};

/// Name printed in front of the character's replies
pub const CHARACTER_NAME: &str = "メスガキ";

const SEPARATOR: &str = "--------------------------------------------------";

/// Whether the user asked to leave
#[must_use]
pub fn is_quit(text: &str) -> bool {
    matches!(text.trim().to_lowercase().as_str(), "quit" | "exit" | "終了")
}

/// One unit of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInput {
    /// Something to answer
    Text(String),
    /// Nothing usable this time; ask again
    Nothing,
    /// End the conversation
    Quit,
}

/// Where user turns come from
///
/// Not `Send`: the voice source owns a live microphone stream.
#[async_trait(?Send)]
pub trait InputSource {
    /// Wait for the next user turn
    ///
    /// # Errors
    ///
    /// Returns error if the source itself failed
    async fn next_input(&mut self) -> Result<UserInput>;

    /// Whether input is spoken
    fn is_voice(&self) -> bool;
}

/// Typed input, one line per turn; end of input quits
pub struct TextInput<R> {
    lines: Lines<R>,
}

impl TextInput<BufReader<Stdin>> {
    /// Read turns from standard input
    #[must_use]
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> TextInput<R> {
    /// Read turns from `reader`
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }
}

#[async_trait(?Send)]
impl<R: AsyncBufRead + Unpin> InputSource for TextInput<R> {
    async fn next_input(&mut self) -> Result<UserInput> {
        print!("\nあなた: ");
        std::io::stdout().flush()?;

        let Some(line) = self.lines.next_line().await? else {
            return Ok(UserInput::Quit);
        };

        let line = line.trim();
        if line.is_empty() {
            Ok(UserInput::Nothing)
        } else if is_quit(line) {
            Ok(UserInput::Quit)
        } else {
            Ok(UserInput::Text(line.to_string()))
        }
    }

    fn is_voice(&self) -> bool {
        false
    }
}

/// Spoken input through the microphone
pub struct VoiceInput {
    listener: Listener,
}

impl VoiceInput {
    /// Wrap a calibrated listener
    #[must_use]
    pub const fn new(listener: Listener) -> Self {
        Self { listener }
    }
}

#[async_trait(?Send)]
impl InputSource for VoiceInput {
    async fn next_input(&mut self) -> Result<UserInput> {
        match self.listener.listen().await {
            Ok(Heard::Speech(text)) => {
                if is_quit(&text) {
                    return Ok(UserInput::Quit);
                }
                println!("あなた: {text}");
                Ok(UserInput::Text(text))
            }
            Ok(Heard::NoSpeech) => Ok(UserInput::Nothing),
            Ok(Heard::Unintelligible) => {
                println!("（聞き取れませんでした）");
                Ok(UserInput::Nothing)
            }
            Err(e) => {
                tracing::warn!(error = %e, "speech recognition failed");
                println!("STTエラー: {e}");
                Ok(UserInput::Nothing)
            }
        }
    }

    fn is_voice(&self) -> bool {
        true
    }
}

/// Drives the conversation until the user quits or interrupts
pub struct Conversation<B, C> {
    chat: C,
    speaker: Speaker<B>,
    synthesizer: Option<Box<dyn Synthesizer>>,
    interrupt: Interrupt,
}

impl<B: AudioBackend, C: ChatModel> Conversation<B, C> {
    /// Create a conversation
    ///
    /// With no synthesizer the replies are printed only.
    pub fn new(
        chat: C,
        speaker: Speaker<B>,
        synthesizer: Option<Box<dyn Synthesizer>>,
        interrupt: Interrupt,
    ) -> Self {
        Self {
            chat,
            speaker,
            synthesizer,
            interrupt,
        }
    }

    /// Run turns from `input` until quit, end of input or interrupt
    ///
    /// Returns the number of answered turns.
    ///
    /// # Errors
    ///
    /// Returns error if the input source fails
    pub async fn run(&mut self, input: &mut dyn InputSource) -> Result<usize> {
        let mode = if input.is_voice() { "音声モード" } else { "テキストモード" };
        println!("\n💬 会話を開始します（{mode}）");
        if input.is_voice() {
            println!("   3teneでリップシンク（音声入力）を有効にしてください。");
            println!("   VOICEVOXの音声出力を3teneが拾ってリップシンクします。");
        }
        println!("   終了するには Ctrl+C（テキストモードでは 'quit' も可）\n");
        println!("{SEPARATOR}");

        let mut turns = 0;
        loop {
            let next = tokio::select! {
                biased;
                () = self.interrupt.triggered() => break,
                next = input.next_input() => next?,
            };

            let text = match next {
                UserInput::Text(text) => text,
                UserInput::Nothing => continue,
                UserInput::Quit => break,
            };

            if self.respond(&text).await.is_none() {
                break;
            }
            turns += 1;
            println!("{SEPARATOR}");
        }

        println!("\nばいばーい♡ またね！");
        tracing::info!(turns, "conversation ended");
        Ok(turns)
    }

    /// Answer one user turn and speak the reply
    ///
    /// Returns `None` if interrupted before the reply arrived.
    pub async fn respond(&mut self, text: &str) -> Option<String> {
        let reply = tokio::select! {
            biased;
            () = self.interrupt.triggered() => return None,
            reply = self.chat.send_message(text) => reply,
        };

        let reply = reply.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "chat request failed, using fallback reply");
            FALLBACK_REPLY.to_string()
        });
        println!("{CHARACTER_NAME}: {reply}");

        if let Some(synthesizer) = &self.synthesizer {
            self.speaker.speak(&reply, synthesizer.as_ref()).await;
        }

        Some(reply)
    }

    /// Speaker used for replies
    #[must_use]
    pub const fn speaker(&self) -> &Speaker<B> {
        &self.speaker
    }

    /// Chat model
    #[must_use]
    pub const fn chat(&self) -> &C {
        &self.chat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quit_words() {
        assert!(is_quit("quit"));
        assert!(is_quit("  EXIT "));
        assert!(is_quit("終了"));
        assert!(!is_quit("quitting"));
        assert!(!is_quit(""));
    }

    #[test]
    fn test_text_input_lines() {
        let reader = BufReader::new(&b"hello\n\n  quit  \nafter\n"[..]);
        let mut input = TextInput::new(reader);

        tokio_test::block_on(async {
            assert_eq!(input.next_input().await.unwrap(), UserInput::Text("hello".into()));
            assert_eq!(input.next_input().await.unwrap(), UserInput::Nothing);
            assert_eq!(input.next_input().await.unwrap(), UserInput::Quit);
            assert_eq!(input.next_input().await.unwrap(), UserInput::Text("after".into()));
            assert_eq!(input.next_input().await.unwrap(), UserInput::Quit);
        });
    }
}

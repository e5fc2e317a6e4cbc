//! Model-family prompt wrapping.
//!
//! Each family is a fixed table of wrap tokens; the family is picked once from
//! the configured model name and reused for every query.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    Mistral,
    ChatMl,
    Phi3,
    Plain,
}

impl ModelFamily {
    /// Guess the family from a model identifier such as `mistral-7b-instruct`.
    pub fn from_model_name(name: &str) -> Self {
        let name = name.trim().to_lowercase();
        if name.contains("mistral") || name.contains("mixtral") {
            ModelFamily::Mistral
        } else if name.contains("phi3") || name.contains("phi-3") {
            ModelFamily::Phi3
        } else if name.contains("qwen") || name.contains("chatml") || name.contains("hermes") {
            ModelFamily::ChatMl
        } else {
            ModelFamily::Plain
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelFamily::Mistral => "mistral",
            ModelFamily::ChatMl => "chatml",
            ModelFamily::Phi3 => "phi3",
            ModelFamily::Plain => "plain",
        };
        f.write_str(name)
    }
}

/// Tokens placed before and after one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wrap {
    pub pre: &'static str,
    pub post: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    pub family: ModelFamily,
    pub initial: &'static str,
    pub system: Wrap,
    pub user: Wrap,
    pub assistant: Wrap,
    /// Appended after the last message to cue the model's turn.
    pub fin: &'static str,
}

const MISTRAL: PromptTemplate = PromptTemplate {
    family: ModelFamily::Mistral,
    initial: "<s>",
    system: Wrap {
        pre: "[INST] \n",
        post: " [/INST]\n",
    },
    user: Wrap {
        pre: "[INST] ",
        post: " [/INST]\n",
    },
    assistant: Wrap {
        pre: " ",
        post: " ",
    },
    fin: "",
};

const CHATML: PromptTemplate = PromptTemplate {
    family: ModelFamily::ChatMl,
    initial: "",
    system: Wrap {
        pre: "<|im_start|>system\n",
        post: "<|im_end|>\n",
    },
    user: Wrap {
        pre: "<|im_start|>user\n",
        post: "<|im_end|>\n",
    },
    assistant: Wrap {
        pre: "<|im_start|>assistant\n",
        post: "<|im_end|>\n",
    },
    fin: "<|im_start|>assistant\n",
};

const PHI3: PromptTemplate = PromptTemplate {
    family: ModelFamily::Phi3,
    initial: "",
    system: Wrap {
        pre: "<|system|>\n",
        post: "<|end|>\n",
    },
    user: Wrap {
        pre: "<|user|>\n",
        post: "<|end|>\n",
    },
    assistant: Wrap {
        pre: "<|assistant|>\n",
        post: "<|end|>\n",
    },
    fin: "<|assistant|>\n",
};

const PLAIN: PromptTemplate = PromptTemplate {
    family: ModelFamily::Plain,
    initial: "",
    system: Wrap {
        pre: "",
        post: "\n\n",
    },
    user: Wrap {
        pre: "User: ",
        post: "\n",
    },
    assistant: Wrap {
        pre: "Assistant: ",
        post: "\n",
    },
    fin: "Assistant:",
};

impl PromptTemplate {
    pub fn for_family(family: ModelFamily) -> &'static PromptTemplate {
        match family {
            ModelFamily::Mistral => &MISTRAL,
            ModelFamily::ChatMl => &CHATML,
            ModelFamily::Phi3 => &PHI3,
            ModelFamily::Plain => &PLAIN,
        }
    }

    pub fn for_model(name: &str) -> &'static PromptTemplate {
        Self::for_family(ModelFamily::from_model_name(name))
    }

    fn wrap(&self, role: Role) -> Wrap {
        match role {
            Role::System => self.system,
            Role::User => self.user,
            Role::Assistant => self.assistant,
        }
    }

    pub fn render(&self, messages: &[Message]) -> String {
        let body: usize = messages.iter().map(|m| m.content.len() + 16).sum();
        let mut prompt = String::with_capacity(self.initial.len() + body + self.fin.len());
        prompt.push_str(self.initial);
        for message in messages {
            let wrap = self.wrap(message.role);
            prompt.push_str(wrap.pre);
            prompt.push_str(&message.content);
            prompt.push_str(wrap.post);
        }
        prompt.push_str(self.fin);
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_lookup() {
        assert_eq!(ModelFamily::from_model_name("Mistral-7B-Instruct"), ModelFamily::Mistral);
        assert_eq!(ModelFamily::from_model_name("phi3-mini"), ModelFamily::Phi3);
        assert_eq!(ModelFamily::from_model_name("qwen2.5-7b"), ModelFamily::ChatMl);
        assert_eq!(ModelFamily::from_model_name("llama-2"), ModelFamily::Plain);
    }

    #[test]
    fn test_mistral_rendering() {
        let template = PromptTemplate::for_model("mistral-7b-instruct");
        let prompt = template.render(&[
            Message::system("Be brief."),
            Message::user("Hi"),
            Message::assistant("Hello"),
            Message::user("Capital of France?"),
        ]);
        assert_eq!(
            prompt,
            "<s>[INST] \nBe brief. [/INST]\n[INST] Hi [/INST]\n Hello [INST] Capital of France? [/INST]\n"
        );
    }

    #[test]
    fn test_chatml_ends_with_assistant_cue() {
        let prompt = PromptTemplate::for_family(ModelFamily::ChatMl).render(&[Message::user("q")]);
        assert_eq!(prompt, "<|im_start|>user\nq<|im_end|>\n<|im_start|>assistant\n");
    }

    #[test]
    fn test_plain_rendering() {
        let prompt = PromptTemplate::for_family(ModelFamily::Plain)
            .render(&[Message::system("ctx"), Message::user("q")]);
        assert_eq!(prompt, "ctx\n\nUser: q\nAssistant:");
    }
}

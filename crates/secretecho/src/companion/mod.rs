//! Companion profile registry.
//!
//! A companion is a static configuration pairing a short code with the
//! system prompt that shapes the model's persona. Five companions ship
//! built in; a configurable directory of `<code>/companion.toml` files can
//! add new profiles or override built-ins at startup:
//!
//! ```text
//! companions/
//! +-- pirate/
//! |   +-- companion.toml
//! +-- doctor/
//!     +-- companion.toml      # overrides the built-in doctor
//! ```
//!
//! Profiles are read-only after loading; the relay only looks them up by
//! code at session start.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Static companion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanionProfile {
    /// Unique short code used in URLs and storage keys.
    pub code: String,
    /// Display name.
    pub name: String,
    /// One-line description for listings.
    pub description: String,
    /// System prompt sent in the upstream setup handshake.
    pub system_prompt: String,
}

/// Listing view of a profile; the system prompt is not exposed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanionSummary {
    pub code: String,
    pub name: String,
    pub description: String,
}

impl From<&CompanionProfile> for CompanionSummary {
    fn from(profile: &CompanionProfile) -> Self {
        Self {
            code: profile.code.clone(),
            name: profile.name.clone(),
            description: profile.description.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct CompanionToml {
    #[serde(default)]
    metadata: CompanionMetadataToml,
    #[serde(default)]
    prompt: String,
}

#[derive(Debug, Deserialize, Default)]
struct CompanionMetadataToml {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
}

static BUILTIN_COMPANIONS: Lazy<Vec<CompanionProfile>> = Lazy::new(|| {
    vec![
        CompanionProfile {
            code: "doctor".to_string(),
            name: "Dr. EchoCare".to_string(),
            description: "General medical guidance and wellness advice".to_string(),
            system_prompt: DOCTOR_PROMPT.to_string(),
        },
        CompanionProfile {
            code: "mind".to_string(),
            name: "EchoMind".to_string(),
            description: "Study mentor for academic concepts and learning strategies"
                .to_string(),
            system_prompt: MIND_PROMPT.to_string(),
        },
        CompanionProfile {
            code: "fit".to_string(),
            name: "EchoFit".to_string(),
            description: "Fitness coach for workouts, goals and nutrition".to_string(),
            system_prompt: FIT_PROMPT.to_string(),
        },
        CompanionProfile {
            code: "buddy".to_string(),
            name: "EchoBuddy".to_string(),
            description: "A warm, empathetic friend to chat with".to_string(),
            system_prompt: BUDDY_PROMPT.to_string(),
        },
        CompanionProfile {
            code: "chef".to_string(),
            name: "Chef EchoBite".to_string(),
            description: "Culinary guide for recipes, tips and meal planning".to_string(),
            system_prompt: CHEF_PROMPT.to_string(),
        },
    ]
});

/// Read-only lookup table of companion profiles.
#[derive(Debug, Clone)]
pub struct CompanionRegistry {
    profiles: HashMap<String, CompanionProfile>,
}

impl CompanionRegistry {
    /// Registry containing only the built-in companions.
    pub fn builtin() -> Self {
        let profiles = BUILTIN_COMPANIONS
            .iter()
            .map(|p| (p.code.clone(), p.clone()))
            .collect();
        Self { profiles }
    }

    /// Built-ins plus any `<code>/companion.toml` profiles found under
    /// `dir`. A profile whose directory name matches a built-in code
    /// replaces it. Unreadable entries are logged and skipped.
    pub fn with_overrides(dir: &Path) -> Result<Self> {
        let mut registry = Self::builtin();

        if !dir.exists() {
            return Ok(registry);
        }

        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("reading companions directory {:?}", dir))?;

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() || !path.join("companion.toml").exists() {
                continue;
            }

            match Self::load_profile(&path) {
                Ok(profile) => {
                    registry.profiles.insert(profile.code.clone(), profile);
                }
                Err(err) => {
                    tracing::warn!("Failed to load companion from {:?}: {}", path, err);
                }
            }
        }

        Ok(registry)
    }

    fn load_profile(companion_dir: &Path) -> Result<CompanionProfile> {
        let code = companion_dir
            .file_name()
            .and_then(|n| n.to_str())
            .map(|s| s.to_string())
            .context("companion directory has no usable name")?;

        let toml_path = companion_dir.join("companion.toml");
        let content = std::fs::read_to_string(&toml_path)
            .with_context(|| format!("reading companion.toml from {:?}", toml_path))?;
        let parsed: CompanionToml = toml::from_str(&content)
            .with_context(|| format!("parsing companion.toml from {:?}", toml_path))?;

        if parsed.prompt.trim().is_empty() {
            anyhow::bail!("companion {:?} has an empty prompt", code);
        }

        let name = if parsed.metadata.name.is_empty() {
            code.clone()
        } else {
            parsed.metadata.name
        };

        Ok(CompanionProfile {
            code,
            name,
            description: parsed.metadata.description,
            system_prompt: parsed.prompt,
        })
    }

    /// Look up a profile by code.
    pub fn get(&self, code: &str) -> Option<&CompanionProfile> {
        self.profiles.get(code)
    }

    /// List all profiles, sorted by name.
    pub fn list(&self) -> Vec<CompanionSummary> {
        let mut summaries: Vec<CompanionSummary> =
            self.profiles.values().map(CompanionSummary::from).collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }
}

const DOCTOR_PROMPT: &str = "You are Dr. EchoCare, a compassionate and knowledgeable AI doctor companion for the Secret Echo web app. For your first message to a new user, briefly introduce yourself as Dr. EchoCare, explain that you can provide general medical guidance, and ask how you can help with their health concerns today. Follow these guidelines when responding to users: \n\
    1. Provide concise, medically-sound advice and information using professional medical terminology when appropriate. \n\
    2. Always reference the user's chat history to provide continuity of care. Ask follow-up questions about previously discussed symptoms or conditions (e.g., \"Has your fever improved since we last spoke?\"). \n\
    3. Structure your responses like a medical consultation: start with a brief greeting and reference to previous interactions when applicable, ask targeted follow-up questions about previously discussed conditions, provide clear, actionable recommendations, and end with an appropriate closing that encourages continued engagement. \n\
    4. When analyzing symptoms, ask clear, direct questions to gather relevant information, consider common causes and differential diagnoses, explain your reasoning in accessible language, and recommend appropriate home care and monitoring when safe to do so. \n\
    5. For wellness advice, provide evidence-based recommendations tailored to the user's specific situation and history. \n\
    6. Always maintain appropriate medical boundaries: never diagnose serious conditions definitively, recommend in-person medical care when symptoms suggest urgent concerns, and clarify that you're providing general guidance, not replacing professional medical evaluation. \n\
    7. Use a professional yet approachable tone that balances medical authority with empathy and understanding. \n\
    8. Incorporate emojis thoughtfully to make chats more engaging (e.g., \u{1FA7A} for medical advice, \u{2764}\u{FE0F} for empathy), but keep usage minimal to maintain professionalism. \n\
    Remember: Your goal is to provide consistent, personalized healthcare guidance that takes into account the user's ongoing medical journey and history of interactions.";

const MIND_PROMPT: &str = "You are EchoMind, a patient and knowledgeable AI study mentor for the Secret Echo web app. For your first message to a new user, introduce yourself as EchoMind, explain that you can help with studying, academic concepts, and learning strategies, and ask what subjects they're currently working on or struggling with. Follow these guidelines when helping users: \n\
    1. Reference previous study sessions and topics discussed to provide continuity in learning (e.g., \"Last time we worked on calculus derivatives, shall we continue or explore a new topic?\"). \n\
    2. Structure your responses like an effective tutor: begin with acknowledgment of previous learning, ask about specific challenges with current material, explain concepts using multiple approaches (visual, analogical, practical), break down complex ideas into manageable parts, and end with a summary and suggestion for next steps. \n\
    3. When explaining academic concepts, start with fundamentals before advancing to complex details, use concrete examples relevant to the user's interests or previous discussions, explain your reasoning step-by-step, and encourage active learning through questions. \n\
    4. For study techniques, recommend evidence-based approaches tailored to the user's learning style, suggest specific productivity tools or methods based on their previous challenges, and provide customized strategies for their upcoming exams or projects. \n\
    5. Maintain academic integrity by guiding problem-solving rather than simply providing answers, teaching underlying principles, and encouraging critical thinking. \n\
    6. Use an encouraging, patient tone that builds confidence while maintaining educational authority. \n\
    7. Incorporate emojis thoughtfully to make chats more engaging (e.g., \u{1F4DA} for studying, \u{1F4A1} for ideas), but keep usage minimal to maintain a professional tone. \n\
    Remember: Your goal is to provide personalized academic support that builds on previous interactions and helps the user develop as an independent learner.";

const FIT_PROMPT: &str = "You are EchoFit, an energetic and knowledgeable AI fitness coach for the Secret Echo web app. For your first message to a new user, introduce yourself as EchoFit, explain that you can help with workout plans, fitness goals, and nutrition advice, and ask about their current fitness level and what goals they're hoping to achieve. Follow these guidelines when supporting users: \n\
    1. Maintain a detailed understanding of the user's fitness journey by referencing previous workouts, goals, and challenges (e.g., \"How did your legs feel after the squat routine we discussed last time?\"). \n\
    2. Structure your responses like a professional fitness session: begin with a check-in about previous workouts or recovery, address specific questions or challenges, provide clear, actionable fitness guidance, and end with encouragement and suggested next steps. \n\
    3. When designing workout plans, adjust recommendations based on the user's reported progress and feedback, include appropriate warm-up and cool-down activities, explain the purpose behind exercises and proper form, and suggest modifications based on equipment availability or physical limitations. \n\
    4. For nutrition and recovery advice, provide evidence-based recommendations tailored to their specific goals, follow up on previously discussed nutrition challenges, suggest practical meal ideas aligned with their dietary preferences, and emphasize the importance of hydration and sleep. \n\
    5. Track progress by referencing previous benchmarks mentioned in chat history, celebrating improvements and milestones, and adjusting plans when current approaches aren't working. \n\
    6. Maintain appropriate fitness boundaries: never promote extreme weight loss techniques or harmful practices, recommend medical consultation for pain or concerning symptoms, and emphasize sustainable habits over quick fixes. \n\
    7. Use a motivating yet realistic tone that balances enthusiasm with practical guidance. \n\
    8. Incorporate emojis thoughtfully to make chats more engaging (e.g., \u{1F4AA} for workouts, \u{1F957} for nutrition), using them frequently to match your energetic tone. \n\
    Remember: Your goal is to provide consistent, personalized fitness coaching that acknowledges the user's ongoing journey and builds upon your previous interactions.";

const BUDDY_PROMPT: &str = "You are EchoBuddy, a warm and empathetic AI friend for the Secret Echo web app. For your first message to a new user, warmly introduce yourself as EchoBuddy, mention that you're here to chat, listen, and keep them company, and ask how they're doing today or what's on their mind. Follow these guidelines when connecting with users: \n\
    1. Build genuine rapport by remembering personal details and referencing previous conversations (e.g., \"How did that presentation go that you were nervous about?\"). \n\
    2. Structure your responses like a thoughtful friend would: acknowledge their feelings and previous interactions, respond directly to their immediate concerns, share relevant thoughts or gentle advice when appropriate, and end with open-ended questions that encourage further sharing. \n\
    3. When providing emotional support, validate their feelings without judgment, offer perspective in a gentle, understanding way, and know when to simply listen rather than problem-solve. \n\
    4. For casual conversation, match their energy and conversational style, remember their interests, jokes, and preferences from previous chats, and ask follow-up questions about ongoing situations in their life. \n\
    5. Maintain appropriate boundaries: recognize when issues require professional help, gently suggest additional support for serious concerns, and never claim to replace human connection. \n\
    6. Use a conversational, warm tone that feels like texting with a close friend who truly remembers your life. \n\
    7. Incorporate emojis frequently to make chats more engaging and friendly (e.g., \u{1F60A} for warmth, \u{1F31F} for excitement), reflecting your empathetic and casual tone. \n\
    Remember: Your goal is to provide consistent, emotionally intelligent companionship that acknowledges the ongoing relationship and creates a sense of being truly heard and remembered.";

const CHEF_PROMPT: &str = "You are Chef EchoBite, a friendly and creative AI culinary guide for the Secret Echo web app. For your first message to a new user, introduce yourself as Chef EchoBite, explain that you can help with recipes, cooking tips, and meal planning, and ask about their cooking experience and food preferences. Follow these guidelines when assisting users: \n\
    1. Provide personalized culinary guidance by remembering food preferences, dietary restrictions, and cooking skill levels from previous conversations (e.g., \"Last time you mentioned enjoying Thai flavors but avoiding shellfish - would you like to try a new plant-based Thai recipe?\"). \n\
    2. Structure your responses like a cooking session with a personal chef: begin with a greeting that references previous culinary discussions, address specific questions or challenges, provide clear, practical cooking advice, and end with encouragement and suggestions for future cooking adventures. \n\
    3. When sharing recipes, adapt complexity based on their previously mentioned cooking skills, include ingredient substitutions based on their pantry items or preferences, explain techniques in accessible language, and highlight the why behind crucial steps to build their cooking intuition. \n\
    4. For meal planning, remember previously discussed dietary goals and restrictions, suggest complementary dishes based on their taste preferences, recommend seasonal ingredients and cost-effective options, and balance nutrition and flavor based on their priorities. \n\
    5. Build culinary confidence by acknowledging their previous cooking successes, providing troubleshooting tips for past challenges, and gradually introducing new techniques building on their experience. \n\
    6. Maintain helpful boundaries: provide modifications for common allergies and dietary needs, encourage food safety best practices, and suggest professional consultation for specialized dietary requirements. \n\
    7. Use a warm, encouraging tone that balances expertise with approachability, like a knowledgeable friend in the kitchen. \n\
    8. Incorporate emojis thoughtfully to make chats more engaging (e.g., \u{1F469}\u{200D}\u{1F373} for cooking, \u{1F372} for recipes), using them frequently to match your friendly tone. \n\
    Remember: Your goal is to provide consistent, personalized culinary guidance that acknowledges the user's evolving cooking journey and builds upon your previous conversations.";

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_companions() {
        let registry = CompanionRegistry::builtin();
        for code in ["doctor", "mind", "fit", "buddy", "chef"] {
            let profile = registry.get(code).unwrap();
            assert_eq!(profile.code, code);
            assert!(!profile.system_prompt.is_empty());
        }
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    fn test_list_sorted_by_name() {
        let registry = CompanionRegistry::builtin();
        let listed = registry.list();
        assert_eq!(listed.len(), 5);
        let names: Vec<&str> = listed.iter().map(|c| c.name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_override_from_toml() {
        let dir = TempDir::new().unwrap();
        let pirate_dir = dir.path().join("pirate");
        std::fs::create_dir(&pirate_dir).unwrap();
        std::fs::write(
            pirate_dir.join("companion.toml"),
            r#"
[metadata]
name = "Captain Echo"
description = "Talks like a pirate"

prompt = "You are Captain Echo, a pirate companion."
"#,
        )
        .unwrap();

        // Override the built-in buddy
        let buddy_dir = dir.path().join("buddy");
        std::fs::create_dir(&buddy_dir).unwrap();
        std::fs::write(
            buddy_dir.join("companion.toml"),
            r#"
[metadata]
name = "Rewired Buddy"

prompt = "You are a rewired buddy."
"#,
        )
        .unwrap();

        let registry = CompanionRegistry::with_overrides(dir.path()).unwrap();

        let pirate = registry.get("pirate").unwrap();
        assert_eq!(pirate.name, "Captain Echo");
        assert_eq!(pirate.system_prompt, "You are Captain Echo, a pirate companion.");

        let buddy = registry.get("buddy").unwrap();
        assert_eq!(buddy.name, "Rewired Buddy");

        // Other built-ins untouched
        assert!(registry.get("doctor").is_some());
    }

    #[test]
    fn test_bad_toml_skipped() {
        let dir = TempDir::new().unwrap();
        let broken_dir = dir.path().join("broken");
        std::fs::create_dir(&broken_dir).unwrap();
        std::fs::write(broken_dir.join("companion.toml"), "not [valid toml").unwrap();

        let registry = CompanionRegistry::with_overrides(dir.path()).unwrap();
        assert!(registry.get("broken").is_none());
        assert_eq!(registry.list().len(), 5);
    }

    #[test]
    fn test_missing_dir_is_fine() {
        let registry =
            CompanionRegistry::with_overrides(Path::new("/nonexistent/companions")).unwrap();
        assert_eq!(registry.list().len(), 5);
    }
}

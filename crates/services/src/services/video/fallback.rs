//! Read-only keyword and footage fallbacks.

use std::collections::HashSet;

use super::footage::{CandidateOrigin, Orientation, VideoCandidate};

/// Phrases used when keyword extraction fails, chosen by trigger words in
/// the source text.
#[derive(Debug, Clone)]
pub struct KeywordCategory {
    pub name: &'static str,
    pub triggers: Vec<&'static str>,
    pub phrases: Vec<String>,
}

/// Built once at startup and shared between pipeline runs.
#[derive(Debug, Clone)]
pub struct FallbackCatalog {
    categories: Vec<KeywordCategory>,
    default_phrases: Vec<String>,
    generic_pool: Vec<String>,
    emergency_clips: Vec<String>,
    stop_words: HashSet<&'static str>,
}

fn phrases(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl FallbackCatalog {
    pub fn builtin() -> Self {
        let categories = vec![
            KeywordCategory {
                name: "registration",
                triggers: vec!["inscripción", "inscripciones", "inscripcion", "matrícula", "matricula", "registro", "admisión", "admision"],
                phrases: phrases(&[
                    "students registering university office",
                    "university admission paperwork",
                    "students waiting university hallway",
                ]),
            },
            KeywordCategory {
                name: "exams",
                triggers: vec!["examen", "exámenes", "examenes", "evaluación", "evaluacion", "parcial", "prueba"],
                phrases: phrases(&[
                    "students taking exam classroom",
                    "student writing test paper",
                    "focused students studying desk",
                ]),
            },
            KeywordCategory {
                name: "graduation",
                triggers: vec!["graduación", "graduacion", "titulación", "titulacion", "defensa", "tesis", "egresados"],
                phrases: phrases(&[
                    "college graduation ceremony caps",
                    "graduates throwing caps celebration",
                    "student presenting thesis defense",
                ]),
            },
            KeywordCategory {
                name: "events",
                triggers: vec!["conferencia", "seminario", "taller", "congreso", "feria", "charla", "simposio"],
                phrases: phrases(&[
                    "academic conference speaker audience",
                    "university seminar lecture hall",
                    "students attending workshop",
                ]),
            },
            KeywordCategory {
                name: "scholarships",
                triggers: vec!["beca", "becas", "convocatoria", "financiamiento"],
                phrases: phrases(&[
                    "happy student receiving scholarship",
                    "students celebrating good news",
                    "university campus students walking",
                ]),
            },
            KeywordCategory {
                name: "sports_culture",
                triggers: vec!["deporte", "deportes", "campeonato", "torneo", "cultural", "festival", "danza"],
                phrases: phrases(&[
                    "university sports team playing",
                    "students cultural dance festival",
                    "college students cheering crowd",
                ]),
            },
        ];

        Self {
            categories,
            default_phrases: phrases(&[
                "university campus students walking",
                "students studying library books",
                "modern classroom lecture students",
            ]),
            generic_pool: phrases(&[
                "university campus aerial view",
                "students walking campus",
                "college students studying together",
                "lecture hall students listening",
            ]),
            emergency_clips: phrases(&[
                "https://videos.pexels.com/video-files/5198159/5198159-uhd_2160_3840_25fps.mp4",
                "https://videos.pexels.com/video-files/6929255/6929255-uhd_2160_3840_25fps.mp4",
            ]),
            stop_words: [
                "a", "an", "the", "of", "in", "on", "at", "and", "or", "for", "to", "with",
                "de", "del", "la", "el", "los", "las", "un", "una", "y", "en", "con", "para", "por",
            ]
            .into_iter()
            .collect(),
        }
    }

    fn find_category(&self, raw_text: &str) -> Option<&KeywordCategory> {
        let lowered = raw_text.to_lowercase();
        let words: HashSet<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        self.categories
            .iter()
            .find(|category| category.triggers.iter().any(|t| words.contains(t)))
    }

    /// Phrases for the first category whose trigger occurs in `raw_text`,
    /// or the default set.
    pub fn phrases_for(&self, raw_text: &str) -> &[String] {
        self.find_category(raw_text)
            .map(|category| category.phrases.as_slice())
            .unwrap_or(&self.default_phrases)
    }

    pub fn category_for(&self, raw_text: &str) -> Option<&'static str> {
        self.find_category(raw_text).map(|category| category.name)
    }

    pub fn generic_pool(&self) -> &[String] {
        &self.generic_pool
    }

    pub fn emergency_candidates(&self) -> Vec<VideoCandidate> {
        self.emergency_clips
            .iter()
            .map(|url| VideoCandidate {
                source_url: url.clone(),
                orientation: Orientation::Portrait,
                width: 2160,
                height: 3840,
                origin: CandidateOrigin::Emergency,
                query: "emergency".to_string(),
            })
            .collect()
    }

    pub fn is_stop_word(&self, word: &str) -> bool {
        self.stop_words.contains(word.to_lowercase().as_str())
    }
}

impl Default for FallbackCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

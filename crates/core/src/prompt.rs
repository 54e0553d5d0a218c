use crate::models::{Document, RetrievalMatch};

pub const DEFAULT_DELIMITER: &str = "\n\n---\n\n";

/// Hand-off data for the external chat-completion call: the grounded system
/// prompt plus the user's chat turn. Nothing here performs the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundedPrompt {
    pub system: String,
    pub user: String,
}

/// Policy hook. A rule inspects the resolved document set and may contribute
/// one directive paragraph to the system prompt; content policy stays out of
/// the assembler itself.
pub trait DisclosureRule: Send + Sync {
    fn directive(&self, documents: &[Document]) -> Option<String>;
}

/// Membership check against a configured slug allow-list. If any document in
/// the set is listed, `when_matched` is emitted, otherwise `when_unmatched`;
/// either side may be absent.
pub struct SlugListRule {
    pub slugs: Vec<String>,
    pub when_matched: Option<String>,
    pub when_unmatched: Option<String>,
}

impl DisclosureRule for SlugListRule {
    fn directive(&self, documents: &[Document]) -> Option<String> {
        let matched = documents
            .iter()
            .any(|document| self.slugs.contains(&document.slug));
        if matched {
            self.when_matched.clone()
        } else {
            self.when_unmatched.clone()
        }
    }
}

pub struct PromptAssembler {
    delimiter: String,
    rules: Vec<Box<dyn DisclosureRule>>,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

impl PromptAssembler {
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: impl DisclosureRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Builds the grounded prompt from ranked matches. Each excerpt is
    /// annotated with its page, and with its source title once the document
    /// set has more than one member.
    pub fn assemble(
        &self,
        question: &str,
        matches: &[RetrievalMatch],
        documents: &[Document],
    ) -> GroundedPrompt {
        let multi_source = documents.len() > 1;

        let context = matches
            .iter()
            .map(|matched| {
                let mut annotated = format!("[Page {}]", matched.page);
                if multi_source {
                    annotated.push_str(&format!(" [Source: {}]", matched.document.title));
                }
                annotated.push('\n');
                annotated.push_str(&matched.content);
                annotated
            })
            .collect::<Vec<_>>()
            .join(&self.delimiter);

        let mut system = String::from(
            "You answer questions strictly from the excerpts below.\n\nExcerpts:\n",
        );
        system.push_str(&context);
        system.push_str("\n\n");
        system.push_str(citation_instructions(multi_source));

        for rule in &self.rules {
            if let Some(directive) = rule.directive(documents) {
                system.push_str("\n\n");
                system.push_str(&directive);
            }
        }

        GroundedPrompt {
            system,
            user: question.to_string(),
        }
    }
}

fn citation_instructions(multi_source: bool) -> &'static str {
    if multi_source {
        "Mark every factual claim with a numbered footnote like [1], and end \
         the answer with a footnote list resolving each number to its source \
         and page, formatted (Source Title, p. N).\n\n\
         The excerpts come from more than one source. When sources disagree, \
         present both positions with separate citations rather than silently \
         reconciling them; when recency is discoverable, prefer the more \
         recent guidance."
    } else {
        "Mark every factual claim with a numbered footnote like [1], and end \
         the answer with a footnote list resolving each number to its page, \
         formatted (p. N)."
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmbeddingModel;
    use chrono::Utc;
    use uuid::Uuid;

    fn document(slug: &str, title: &str) -> Document {
        Document {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            title: title.to_string(),
            owner_group: "ops".to_string(),
            embedding_model: EmbeddingModel::Local,
            active: true,
            created_at: Utc::now(),
        }
    }

    fn matched(document: &Document, content: &str, page: u32, score: f64) -> RetrievalMatch {
        RetrievalMatch {
            chunk_id: format!("{}-{page}", document.slug),
            content: content.to_string(),
            page,
            score,
            document: document.clone(),
        }
    }

    #[test]
    fn single_document_prompts_cite_by_page_only() {
        let doc = document("handbook", "Employee Handbook");
        let matches = vec![
            matched(&doc, "PTO accrues monthly.", 3, 0.9),
            matched(&doc, "Carryover caps at five days.", 5, 0.8),
        ];

        let prompt =
            PromptAssembler::default().assemble("How does PTO work?", &matches, &[doc.clone()]);

        assert!(prompt.system.contains("[Page 3]\nPTO accrues monthly."));
        assert!(prompt.system.contains("[Page 5]\nCarryover caps at five days."));
        assert!(prompt.system.contains("formatted (p. N)"));
        assert!(!prompt.system.contains("[Source:"));
        assert!(!prompt.system.contains("disagree"));
        assert_eq!(prompt.user, "How does PTO work?");
    }

    #[test]
    fn multi_document_prompts_name_sources_and_carry_conflict_rules() {
        let first = document("handbook", "Employee Handbook");
        let second = document("policies", "Security Policies");
        let matches = vec![
            matched(&first, "Badge in at the front desk.", 2, 0.9),
            matched(&second, "Badges expire yearly.", 7, 0.85),
        ];

        let prompt = PromptAssembler::default().assemble(
            "What are the badge rules?",
            &matches,
            &[first, second],
        );

        assert!(prompt.system.contains("[Page 2] [Source: Employee Handbook]"));
        assert!(prompt.system.contains("[Page 7] [Source: Security Policies]"));
        assert!(prompt.system.contains("(Source Title, p. N)"));
        assert!(prompt.system.contains("When sources disagree"));
        assert!(prompt.system.contains("prefer the more recent guidance"));
    }

    #[test]
    fn excerpts_keep_their_ranked_order_and_delimiter() {
        let doc = document("handbook", "Employee Handbook");
        let matches = vec![
            matched(&doc, "first excerpt", 1, 0.9),
            matched(&doc, "second excerpt", 2, 0.5),
        ];

        let prompt = PromptAssembler::new("\n===\n").assemble("q", &matches, &[doc.clone()]);

        let first = prompt.system.find("first excerpt").unwrap();
        let second = prompt.system.find("second excerpt").unwrap();
        assert!(first < second);
        assert!(prompt.system.contains("\n===\n"));
    }

    #[test]
    fn slug_rules_fire_on_membership() {
        let rule = SlugListRule {
            slugs: vec!["benefits".to_string()],
            when_matched: Some("For enrollment questions, refer members to the benefits portal.".to_string()),
            when_unmatched: Some("Do not mention the benefits portal.".to_string()),
        };
        let assembler = PromptAssembler::default().with_rule(rule);

        let listed = document("benefits", "Benefits Guide");
        let prompt = assembler.assemble("q", &[], &[listed]);
        assert!(prompt.system.contains("refer members to the benefits portal"));

        let unlisted = document("handbook", "Employee Handbook");
        let prompt = assembler.assemble("q", &[], &[unlisted]);
        assert!(prompt.system.contains("Do not mention the benefits portal."));
    }

    #[test]
    fn silent_rules_add_nothing() {
        let rule = SlugListRule {
            slugs: vec!["benefits".to_string()],
            when_matched: Some("matched directive".to_string()),
            when_unmatched: None,
        };
        let assembler = PromptAssembler::default().with_rule(rule);

        let unlisted = document("handbook", "Employee Handbook");
        let prompt = assembler.assemble("q", &[], &[unlisted]);
        assert!(!prompt.system.contains("matched directive"));
    }
}

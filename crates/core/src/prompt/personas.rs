//! Fixed persona/instruction text per feature.

const STUDIO_VOICE: &str = "You are the production brain of a content studio. \
    You help one creator draft stories, storyboards, marketing copy, and publishing schedules. \
    Be concrete and brief; prefer actionable steps over commentary.";

const MEMORY_RULES: &str = "Sections labelled with memory headings are accumulated lessons from past work. \
    Follow them when relevant, never quote them back verbatim, and prefer the most recent line when two conflict.";

fn compose(task: &str) -> String {
    [STUDIO_VOICE, MEMORY_RULES, task].join("\n\n")
}

pub fn chat() -> String {
    compose(
        "Answer the creator's message. When they ask to create a project, schedule a task, or \
         create a character, call the matching tool with complete arguments instead of describing it.",
    )
}

pub fn schedule(week: &[chrono::NaiveDate]) -> String {
    let days = week.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ");
    compose(&format!(
        "Plan one week of publishing tasks for these dates: {days}. Use only channels from the channel directory \
         when it is present. Return a JSON array of objects with keys: date (YYYY-MM-DD), channelName, \
         action, themes (array of short tags). No other text."
    ))
}

pub fn audit() -> String {
    compose(
        "Audit the content below for hook strength, clarity, pacing, and call to action. Return one JSON object \
         with keys: score (integer 0-100), strengths (array of strings), weaknesses (array of strings), \
         strategicDirective (one imperative sentence the studio should apply to all future content).",
    )
}

pub fn marketing() -> String {
    compose(
        "Write marketing variants for the product and audience below, one per channel that fits. Return one JSON \
         object with keys: variants (array of objects with channel, headline, body, callToAction) and \
         strategicDirective (one sentence describing what positioning should be repeated next time).",
    )
}

pub fn video_metadata() -> String {
    compose(
        "Write publishing metadata for a video on the topic below. Return one JSON object with keys: title, \
         description, tags (array), hashtags (array, each starting with #).",
    )
}

pub fn locations() -> String {
    compose(
        "Suggest real filming locations for the request below, using search results to check they exist. \
         Return a JSON array of objects with keys: name, description, visualNotes, bestTime.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn schedule_lists_every_day() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        let text = schedule(&[d(1), d(2)]);
        assert!(text.contains("2024-01-01, 2024-01-02"));
        assert!(text.starts_with(STUDIO_VOICE));
    }

    #[test]
    fn structured_personas_ask_for_json() {
        for p in [audit(), marketing(), video_metadata(), locations()] {
            assert!(p.contains("JSON"));
        }
        assert!(!chat().contains("JSON"));
    }
}

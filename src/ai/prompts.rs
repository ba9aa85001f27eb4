use serde_json::{json, Value};

/// Context the model sees per call; long postings are cut to keep requests small.
const MAX_DESCRIPTION_CHARS: usize = 12_000;
const MAX_ABOUT_CHARS: usize = 1_500;

pub fn extraction_prompt(meta: &str, description: &str, resume: &str) -> String {
    let resume_section = if resume.trim().is_empty() {
        "No resume was provided. Set verdict to \"No Resume\", score to 0, and leave pros and cons empty.".to_string()
    } else {
        format!("Candidate resume:\n{}", resume)
    };

    format!(
        "You are reviewing an internship/job posting for a student.\n\n\
        1. Extract the structured details of the posting. Rewrite the description as compact markdown: \
        keep responsibilities, requirements and perks, drop boilerplate. Use an empty string for anything \
        the posting does not state. locationType is one of Remote, Hybrid, On-site. ppo is true only if a \
        pre-placement offer is mentioned.\n\
        2. Compare the posting with the candidate resume. score is 0-100. verdict is \"Good Match\" \
        (score >= 70), \"Average Match\" (40-69) or \"Poor Match\" (< 40). summary is two sentences; \
        pros and cons list at most three short points each.\n\n\
        Posting metadata:\n{meta}\n\n\
        Posting description:\n{description}\n\n\
        {resume_section}",
        meta = meta,
        description = truncate_chars(description, MAX_DESCRIPTION_CHARS),
        resume_section = resume_section,
    )
}

pub fn extraction_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "details": {
                "type": "OBJECT",
                "properties": {
                    "description": { "type": "STRING" },
                    "stipend": { "type": "STRING" },
                    "company": { "type": "STRING" },
                    "location": { "type": "STRING" },
                    "locationType": { "type": "STRING" },
                    "duration": { "type": "STRING" },
                    "ppo": { "type": "BOOLEAN", "nullable": true },
                    "skills": { "type": "ARRAY", "items": { "type": "STRING" } },
                    "applyBy": { "type": "STRING" },
                    "postedOn": { "type": "STRING" }
                },
                "required": ["description", "stipend", "company", "location", "locationType",
                             "duration", "skills", "applyBy", "postedOn"]
            },
            "match": {
                "type": "OBJECT",
                "properties": {
                    "score": { "type": "INTEGER" },
                    "verdict": {
                        "type": "STRING",
                        "enum": ["Good Match", "Average Match", "Poor Match", "No Resume"]
                    },
                    "summary": { "type": "STRING" },
                    "pros": { "type": "ARRAY", "items": { "type": "STRING" } },
                    "cons": { "type": "ARRAY", "items": { "type": "STRING" } }
                },
                "required": ["score", "verdict", "summary", "pros", "cons"]
            }
        },
        "required": ["details", "match"]
    })
}

pub fn company_prompt(name: &str, location: Option<&str>, about: Option<&str>) -> String {
    let location = location.filter(|l| !l.trim().is_empty()).unwrap_or("Unknown");
    let about = about
        .filter(|a| !a.trim().is_empty())
        .map(|a| truncate_chars(a, MAX_ABOUT_CHARS))
        .unwrap_or("Not provided");

    format!(
        "Assess whether the following company is a legitimate, worthwhile employer for an intern.\n\n\
        Company: {name}\n\
        Location: {location}\n\
        About (as listed by the job board): {about}\n\n\
        Task:\n\
        1. Search for the company to verify its legitimacy and reputation.\n\
        2. Identify the company's website URL.\n\
        3. Estimate the company size (New/Small/Medium/Large).\n\
        4. Determine if it's a well-known brand or a small/unknown entity.\n\n\
        Output format (markdown):\n\
        **Rating:** [1-10]/10\n\
        **Verdict:** [Good/Bad/Neutral]\n\
        **Company Size:** [New/Small/Medium/Large]\n\
        **Website:** [URL or \"Not Found\"]\n\
        **Legitimacy:** [Verified/Unverified/Suspicious]\n\
        **Summary:** [2 sentences on why]\n\
        **Pros:** [List 1-2]\n\
        **Cons:** [List 1-2]",
    )
}

pub fn tailor_prompt(job_description: &str, resume: &str, profile: Option<&str>) -> String {
    let profile_section = match profile {
        Some(p) if !p.trim().is_empty() => format!("Candidate profile (contact links, preferences):\n{}\n\n", p),
        _ => String::new(),
    };

    format!(
        "You are an expert resume writer. Produce a one-page resume tailored to the job below.\n\n\
        IMPORTANT RULES:\n\
        - Stay 100% truthful: only use facts from the provided resume and profile\n\
        - Reorder and reword to emphasise what the job asks for\n\
        - Personal details in the resume are redacted; take contact fields from the profile if given, \
        otherwise leave them empty\n\
        - Use **bold** for key technologies inside bullet points\n\n\
        Job:\n{job_description}\n\n\
        {profile_section}\
        Resume:\n{resume}",
    )
}

pub fn resume_schema() -> Value {
    let string_list = json!({ "type": "ARRAY", "items": { "type": "STRING" } });
    json!({
        "type": "OBJECT",
        "properties": {
            "fullName": { "type": "STRING" },
            "contact": {
                "type": "OBJECT",
                "properties": {
                    "email": { "type": "STRING" },
                    "phone": { "type": "STRING" },
                    "linkedin": { "type": "STRING" },
                    "github": { "type": "STRING" },
                    "portfolio": { "type": "STRING" }
                }
            },
            "summary": { "type": "STRING" },
            "education": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "institution": { "type": "STRING" },
                        "degree": { "type": "STRING" },
                        "date": { "type": "STRING" },
                        "location": { "type": "STRING" },
                        "details": string_list
                    },
                    "required": ["institution", "degree", "date"]
                }
            },
            "experience": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "company": { "type": "STRING" },
                        "role": { "type": "STRING" },
                        "date": { "type": "STRING" },
                        "location": { "type": "STRING" },
                        "details": string_list
                    },
                    "required": ["company", "role", "date"]
                }
            },
            "projects": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "name": { "type": "STRING" },
                        "technologies": { "type": "STRING" },
                        "link": { "type": "STRING" },
                        "date": { "type": "STRING" },
                        "details": string_list
                    },
                    "required": ["name"]
                }
            },
            "skills": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "category": { "type": "STRING" },
                        "items": { "type": "STRING" }
                    },
                    "required": ["category", "items"]
                }
            },
            "certifications": string_list
        },
        "required": ["fullName", "contact", "summary", "education", "experience", "skills"]
    })
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

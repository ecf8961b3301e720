//! Prompt construction for the generate step.

use std::fmt::Write;

/// Fixed rules sent as the system instruction on every generate step.
pub(crate) const SYSTEM_INSTRUCTION: &str = "\
You are CodeOps, an autonomous engineering agent.
Your code runs inside a headless Docker container (Linux/Debian) with no network access.

RULES:
1. Write COMPLETE, RUNNABLE Python scripts.
2. Do NOT use GUI libraries (tkinter, pygame); the container has no screen.
3. If asked for a web server, use standard libraries and print the port you would bind.
4. OUTPUT FORMAT: Return ONLY the raw code inside a ```python markdown code block.
5. Do NOT write Dockerfiles or explanations outside the code block.
";

/// Builds the user prompt for one generate step.
///
/// `feedback` is the most recent failure log entry, inserted verbatim.
pub(crate) fn build_user_prompt(task: &str, feedback: Option<&str>) -> String {
    let mut prompt = String::new();

    let _ = writeln!(prompt, "TASK: {task}");

    if let Some(error) = feedback {
        prompt.push('\n');
        prompt.push_str("## PREVIOUS CODE FAILED\n");
        prompt.push_str("The previous attempt produced this error:\n\n");
        prompt.push_str("```\n");
        prompt.push_str(error);
        prompt.push_str("\n```\n\n");
        prompt.push_str("Fix the error above. Do not repeat the same mistake.\n");
        prompt.push_str(
            "Only use the Python standard library (os, sys, math, random, json, re, time).\n",
        );
    }

    prompt.push_str("\nGenerate the Python solution now.\n");
    prompt
}

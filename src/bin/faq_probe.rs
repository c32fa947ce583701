//! Check which offline stage would answer a question.
//!
//! Usage: cargo run --bin faq_probe <event.json> [question ...]
//!
//! With no questions on the command line, reads one question per line
//! from stdin. Nothing is sent anywhere and no model is called.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use eventbot::chatbot::faq::FaqMatcher;
use eventbot::chatbot::knowledge;
use eventbot::classifier::{classify, Topic};
use eventbot::moderation::DenyList;

fn report_stage(question: &str, deny_list: &DenyList, faq: &FaqMatcher) {
    println!("> {question}");

    if let Some(word) = deny_list.find(question) {
        println!("  moderated (matched {word:?})");
        return;
    }

    if let Some(index) = faq.find_rule(question) {
        let rule = &faq.rules()[index];
        println!("  faq rule #{index} [{}]", rule.name);
        for line in rule.answer.lines() {
            println!("    {line}");
        }
        return;
    }

    match classify(question) {
        Topic::Math => println!("  declined (math)"),
        Topic::Code => println!("  declined (code)"),
        Topic::Other => println!("  would ask the model"),
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <event.json> [question ...]", args[0]);
        eprintln!();
        eprintln!("Shows whether a question is moderated, answered by an FAQ rule,");
        eprintln!("declined as math/code, or passed on to the model.");
        std::process::exit(1);
    }

    let knowledge = match knowledge::try_load(Path::new(&args[1])) {
        Ok(k) => k,
        Err(e) => {
            eprintln!("ERROR: {e}");
            std::process::exit(1);
        }
    };
    println!(
        "Loaded {} day(s) and {} rule(s) from {}",
        knowledge.days.len(),
        knowledge.rules.len(),
        args[1]
    );

    let faq = FaqMatcher::new(Arc::new(knowledge), 0.0);
    let deny_list = DenyList::default();

    if args.len() > 2 {
        for question in &args[2..] {
            report_stage(question, &deny_list, &faq);
        }
        return;
    }

    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        let question = line.trim();
        if !question.is_empty() {
            report_stage(question, &deny_list, &faq);
        }
    }
}

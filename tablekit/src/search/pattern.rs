//! Compiles `Like` patterns to case-insensitive regexes (§4.2 "Pattern compilation").

use regex::Regex;

/// `%` → `.*` (consecutive `%` runs coalesce to one), `_` → `.`, everything else escaped,
/// anchored with `^…$`. Falls back to a pattern that matches nothing on (unexpected) regex
/// compile failure rather than panicking.
pub fn compile_like_pattern(pattern: &str) -> Regex {
	let mut regex_source = String::with_capacity(pattern.len() + 2);
	regex_source.push('^');
	let mut chars = pattern.chars().peekable();
	while let Some(c) = chars.next() {
		match c {
			'%' => {
				regex_source.push_str(".*");
				while chars.peek() == Some(&'%') {
					chars.next();
				}
			}
			'_' => regex_source.push('.'),
			other => regex_source.push_str(&regex::escape(&other.to_string())),
		}
	}
	regex_source.push('$');
	regex::RegexBuilder::new(&regex_source)
		.case_insensitive(true)
		.dot_matches_new_line(true)
		.build()
		.unwrap_or_else(|_| Regex::new("$^").expect("empty-match-nothing pattern is always valid"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn percent_and_underscore_wildcards() {
		let re = compile_like_pattern("%b_r%");
		assert!(re.is_match("a bar baz"));
		assert!(!re.is_match("a bor"));
	}

	#[test]
	fn matching_is_case_insensitive() {
		let re = compile_like_pattern("Hello%");
		assert!(re.is_match("hello world"));
	}

	#[test]
	fn consecutive_percent_runs_coalesce() {
		let re = compile_like_pattern("a%%%b");
		assert!(re.is_match("axxxb"));
		assert!(re.is_match("ab"));
	}

	#[test]
	fn metacharacters_are_escaped() {
		let re = compile_like_pattern("3.14");
		assert!(re.is_match("3.14"));
		assert!(!re.is_match("3x14"));
	}
}

//! `{placeholder}` substitution for command arguments.

use std::collections::BTreeMap;

/// Placeholder values by name (without braces).
pub type TemplateVars = BTreeMap<&'static str, String>;

/// Replace every `{name}` in `arg` whose name is in `vars`. Unknown
/// placeholders are left untouched.
pub fn render(arg: &str, vars: &TemplateVars) -> String {
    let mut out = arg.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_known_and_unknown() {
        let mut vars = TemplateVars::new();
        vars.insert("structure", "/tmp/s.json".to_string());
        vars.insert("accuracy", "1000".to_string());
        assert_eq!(
            render("--in={structure} --max-hdim {accuracy} {other}", &vars),
            "--in=/tmp/s.json --max-hdim 1000 {other}"
        );
    }

    #[test]
    fn test_render_repeated() {
        let mut vars = TemplateVars::new();
        vars.insert("workdir", "w".to_string());
        assert_eq!(render("{workdir}/{workdir}", &vars), "w/w");
    }
}

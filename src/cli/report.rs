use std::io::{self, Write};

use crate::{
    store::catalog::{SiteTotal, TimeReport},
    utils::{
        percentage::{seconds_percentage, Percentage},
        time::format_tracked,
    },
};

const OTHER_GROUP: &str = "Other";

/// Prints the report as tab separated lines. Sites below `min_percentage` of the overall total are
/// hidden but still count towards their project.
pub fn print_report(
    report: &TimeReport,
    min_percentage: Percentage,
    out: &mut impl Write,
) -> io::Result<()> {
    let whole = report.total();

    for project in &report.projects {
        let total = project.total();
        writeln!(
            out,
            "{}\t{}\t{}",
            project.name,
            format_tracked(total),
            seconds_percentage(total, whole)
        )?;
        if !project.open {
            continue;
        }
        print_sites(&project.sites, whole, min_percentage, out)?;
        if let Some(note) = &project.note {
            writeln!(out, "\tnote: {note}")?;
        }
        for (i, todo) in project.todos.iter().enumerate() {
            let mark = if todo.done { 'x' } else { ' ' };
            writeln!(out, "\t[{mark}] {}. {}", i + 1, todo.text)?;
        }
    }

    if !report.unassigned.is_empty() {
        let total = report.unassigned.iter().map(|v| v.seconds).sum();
        writeln!(
            out,
            "{OTHER_GROUP}\t{}\t{}",
            format_tracked(total),
            seconds_percentage(total, whole)
        )?;
        print_sites(&report.unassigned, whole, min_percentage, out)?;
    }

    writeln!(out, "Total\t{}", format_tracked(whole))
}

fn print_sites(
    sites: &[SiteTotal],
    whole: u64,
    min_percentage: Percentage,
    out: &mut impl Write,
) -> io::Result<()> {
    for site in sites {
        let share = seconds_percentage(site.seconds, whole);
        if share < min_percentage {
            continue;
        }
        writeln!(
            out,
            "\t{}\t{}\t{share}",
            site.rule,
            format_tracked(site.seconds)
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::store::{catalog::ProjectReport, entities::TodoItem};

    use super::*;

    fn site(rule: &str, seconds: u64) -> SiteTotal {
        SiteTotal {
            rule: rule.into(),
            seconds,
        }
    }

    fn print(report: &TimeReport, min: f64) -> String {
        let mut out = vec![];
        let min = Percentage::new_opt(min).unwrap();
        print_report(report, min, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_print_report() {
        let mut done = TodoItem::new("deploy");
        done.done = true;
        let report = TimeReport {
            projects: vec![
                ProjectReport {
                    name: "Work".into(),
                    sites: vec![site("github.com", 5400), site("*.jira.com/*", 60)],
                    note: Some("sprint 12".into()),
                    todos: vec![TodoItem::new("review"), done],
                    open: true,
                },
                ProjectReport {
                    name: "Hidden".into(),
                    sites: vec![site("docs.rs", 600)],
                    note: None,
                    todos: vec![],
                    open: false,
                },
            ],
            unassigned: vec![site("news.ycombinator.com", 1140)],
        };

        assert_eq!(
            print(&report, 2.),
            concat!(
                "Work\t1h 31m\t76%\n",
                "\tgithub.com\t1h 30m\t75%\n",
                "\tnote: sprint 12\n",
                "\t[ ] 1. review\n",
                "\t[x] 2. deploy\n",
                "Hidden\t0h 10m\t8%\n",
                "Other\t0h 19m\t16%\n",
                "\tnews.ycombinator.com\t0h 19m\t16%\n",
                "Total\t2h 00m\n",
            )
        );
    }

    #[test]
    fn test_empty_report() {
        assert_eq!(print(&TimeReport::default(), 0.), "Total\t0h 00m\n");
    }
}

use anyhow::{Context, Result};
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};

use crate::domain::value_objects::wolfram::{Pod, PodImage, PodState, Subpod};

/// Parsed `<queryresult>` document of the Wolfram|Alpha v2 query API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub success: bool,
    /// Message of an `<error>` element, e.g. an invalid app id.
    pub error: Option<String>,
    pub pods: Vec<Pod>,
}

#[derive(Default)]
struct PendingImage {
    src: Option<String>,
    alt: Option<String>,
}

/// Where text content is currently being collected.
#[derive(Clone, Copy, PartialEq, Eq)]
enum TextTarget {
    None,
    Plaintext,
    ErrorMessage,
}

pub fn parse_query_result(xml: &str) -> Result<QueryResult> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut result = QueryResult::default();
    let mut saw_root = false;

    let mut pod: Option<Pod> = None;
    let mut subpod: Option<(Subpod, Option<PendingImage>)> = None;
    let mut in_states = false;
    let mut in_error = false;
    let mut text_target = TextTarget::None;
    let mut text = String::new();

    loop {
        let event = reader
            .read_event()
            .with_context(|| format!("malformed xml at byte {}", reader.buffer_position()))?;

        match event {
            Event::Start(ref element) | Event::Empty(ref element) => {
                let is_empty = matches!(event, Event::Empty(_));
                match element.name().as_ref() {
                    b"queryresult" => {
                        saw_root = true;
                        result.success = attr(element, b"success")?.as_deref() == Some("true");
                    }
                    b"pod" => {
                        let next = Pod {
                            title: attr(element, b"title")?.unwrap_or_default(),
                            ..Pod::default()
                        };
                        if is_empty {
                            result.pods.push(next);
                        } else {
                            pod = Some(next);
                        }
                    }
                    b"subpod" if pod.is_some() => {
                        if is_empty {
                            push_subpod(&mut pod, Subpod::default(), None);
                        } else {
                            subpod = Some((Subpod::default(), None));
                        }
                    }
                    b"img" => {
                        if let Some((_, image)) = subpod.as_mut() {
                            *image = Some(PendingImage {
                                src: attr(element, b"src")?,
                                alt: attr(element, b"alt")?,
                            });
                        }
                    }
                    b"plaintext" if subpod.is_some() => {
                        if is_empty {
                            if let Some((current, _)) = subpod.as_mut() {
                                current.plaintext = Some(String::new());
                            }
                        } else {
                            text_target = TextTarget::Plaintext;
                            text.clear();
                        }
                    }
                    b"states" if pod.is_some() && !is_empty => in_states = true,
                    b"state" if in_states => {
                        if let (Some(current), Some(name)) = (pod.as_mut(), attr(element, b"name")?)
                        {
                            let input = attr(element, b"input")?.unwrap_or_default();
                            current.states.push(PodState { name, input });
                        }
                    }
                    b"error" if !is_empty && pod.is_none() => in_error = true,
                    b"msg" if in_error && !is_empty => {
                        text_target = TextTarget::ErrorMessage;
                        text.clear();
                    }
                    _ => {}
                }
            }
            Event::Text(ref content) if text_target != TextTarget::None => {
                text.push_str(&content.unescape()?);
            }
            Event::CData(ref content) if text_target != TextTarget::None => {
                text.push_str(&String::from_utf8_lossy(content));
            }
            Event::End(ref element) => match element.name().as_ref() {
                b"plaintext" if text_target == TextTarget::Plaintext => {
                    if let Some((current, _)) = subpod.as_mut() {
                        current.plaintext = Some(std::mem::take(&mut text));
                    }
                    text_target = TextTarget::None;
                }
                b"msg" if text_target == TextTarget::ErrorMessage => {
                    result.error = Some(std::mem::take(&mut text));
                    text_target = TextTarget::None;
                }
                b"subpod" => {
                    if let Some((current, image)) = subpod.take() {
                        push_subpod(&mut pod, current, image);
                    }
                }
                b"states" => in_states = false,
                b"error" => in_error = false,
                b"pod" => {
                    if let Some(finished) = pod.take() {
                        result.pods.push(finished);
                    }
                    in_states = false;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        anyhow::bail!("response is not a queryresult document");
    }

    Ok(result)
}

/// Attaches a finished subpod to its pod. An image without `src` is dropped and
/// a missing `alt` falls back to the pod title.
fn push_subpod(pod: &mut Option<Pod>, mut subpod: Subpod, image: Option<PendingImage>) {
    let Some(pod) = pod.as_mut() else {
        return;
    };

    subpod.img = image.and_then(|image| {
        let src = image.src.filter(|src| !src.is_empty())?;
        let alt = image
            .alt
            .filter(|alt| !alt.is_empty())
            .unwrap_or_else(|| pod.title.clone());
        Some(PodImage { src, alt })
    });

    pod.subpods.push(subpod);
}

fn attr(element: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attribute in element.attributes() {
        let attribute = attribute?;
        if attribute.key.as_ref() == key {
            return Ok(Some(attribute.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DERIVATIVE: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<queryresult success='true' error='false' numpods='3' datatypes='' version='2.6'>
 <pod title='Derivative' scanner='Derivative' id='Input' position='100' numsubpods='1' primary='true'>
  <subpod title=''>
   <img src='https://www5a.wolframalpha.com/Calculate/MSP/MSP1.gif' alt='d/dx(x^2) = 2 x' title='d/dx(x^2) = 2 x' width='100' height='40' />
   <plaintext>d/dx(x^2) = 2 x</plaintext>
  </subpod>
  <states count='1'>
   <state name='Step-by-step solution' input='Input__Step-by-step solution' stepbystep='true' />
  </states>
 </pod>
 <pod title='Plots' scanner='Derivative' id='Plot' position='200' numsubpods='2'>
  <subpod title=''>
   <img src='https://example.test/plot1.gif' width='300' height='200' />
   <plaintext></plaintext>
  </subpod>
  <subpod title=''>
   <img src='https://example.test/plot2.gif' alt='' />
   <plaintext />
  </subpod>
 </pod>
 <pod title='Indefinite integral' id='IndefiniteIntegral' numsubpods='1'>
  <subpod title=''>
   <img alt='missing src' />
   <plaintext>integral 2 x dx = x^2 + constant &amp; more</plaintext>
  </subpod>
  <states count='2'>
   <statelist count='2' value='Approximate form'>
    <state name='Approximate form' input='IndefiniteIntegral__Approximate form' />
    <state name='Exact form' input='IndefiniteIntegral__Exact form' />
   </statelist>
  </states>
 </pod>
</queryresult>"#;

    #[test]
    fn parses_pods_subpods_and_states() {
        let result = parse_query_result(DERIVATIVE).unwrap();

        assert!(result.success);
        assert_eq!(result.error, None);
        assert_eq!(result.pods.len(), 3);

        let derivative = &result.pods[0];
        assert_eq!(derivative.title, "Derivative");
        assert_eq!(derivative.subpods.len(), 1);
        assert_eq!(
            derivative.subpods[0].plaintext.as_deref(),
            Some("d/dx(x^2) = 2 x")
        );
        assert_eq!(
            derivative.subpods[0].img,
            Some(PodImage {
                src: "https://www5a.wolframalpha.com/Calculate/MSP/MSP1.gif".to_string(),
                alt: "d/dx(x^2) = 2 x".to_string(),
            })
        );
        assert_eq!(
            derivative.states,
            vec![PodState {
                name: "Step-by-step solution".to_string(),
                input: "Input__Step-by-step solution".to_string(),
            }]
        );
    }

    #[test]
    fn image_alt_falls_back_to_pod_title() {
        let result = parse_query_result(DERIVATIVE).unwrap();
        let plots = &result.pods[1];

        assert_eq!(plots.subpods.len(), 2);
        for subpod in &plots.subpods {
            assert_eq!(subpod.img.as_ref().unwrap().alt, "Plots");
        }
        assert!(plots.states.is_empty());
    }

    #[test]
    fn image_without_src_is_dropped_and_entities_unescaped() {
        let result = parse_query_result(DERIVATIVE).unwrap();
        let integral = &result.pods[2];

        assert_eq!(integral.subpods[0].img, None);
        assert_eq!(
            integral.subpods[0].plaintext.as_deref(),
            Some("integral 2 x dx = x^2 + constant & more")
        );
        assert_eq!(integral.states.len(), 2);
        assert_eq!(integral.states[1].name, "Exact form");
    }

    #[test]
    fn reports_api_errors_without_pods() {
        let xml = r#"<queryresult success='false' error='true' numpods='0'>
 <error>
  <code>1</code>
  <msg>Invalid appid</msg>
 </error>
</queryresult>"#;

        let result = parse_query_result(xml).unwrap();

        assert!(!result.success);
        assert!(result.pods.is_empty());
        assert_eq!(result.error.as_deref(), Some("Invalid appid"));
    }

    #[test]
    fn empty_result_has_no_pods() {
        let result =
            parse_query_result("<queryresult success='false' error='false' numpods='0' />")
                .unwrap();

        assert!(!result.success);
        assert!(result.pods.is_empty());
    }

    #[test]
    fn rejects_documents_that_are_not_query_results() {
        assert!(parse_query_result("<html><body>Bad gateway</body></html>").is_err());
        assert!(parse_query_result("").is_err());
    }
}

//! Typed scan helpers for the dotXSI grammar.
//!
//! Every value in a dotXSI template is followed by a comma, including the
//! last one before a closing brace. Numbers may carry a leading `-`.

use xsi_math::Vec3;

use super::scanner::{ParseError, ParseResult, Scanner, TokenKind};

impl<'a> Scanner<'a> {
    /// Composite identifier such as `MDL-Arm` or `Softimage.OGLMulti.1.0`.
    ///
    /// Segments are glued only when no whitespace separates them.
    pub fn scan_xsi_name(&mut self) -> ParseResult<String> {
        let mut name = self.scan_name()?.to_string();
        while self.is_glued() && (self.is_punct('-') || self.is_punct('.')) {
            name.push_str(self.text());
            self.advance()?;
            if !self.is_glued() {
                return Err(self.error(format!("incomplete name '{name}'")));
            }
            match self.kind() {
                TokenKind::Name | TokenKind::Int | TokenKind::Float => {
                    name.push_str(self.text());
                    self.advance()?;
                }
                _ => return Err(self.error(format!("incomplete name '{name}'"))),
            }
        }
        Ok(name)
    }

    /// `"text",`
    pub fn scan_string(&mut self) -> ParseResult<String> {
        let value = self.scan_str()?.to_string();
        self.expect_punct(',')?;
        Ok(value)
    }

    /// `[-]123,`
    pub fn scan_int(&mut self) -> ParseResult<i32> {
        let negative = self.if_punct('-')?;
        let line = self.line();
        let value = self.scan_uint()?;
        self.expect_punct(',')?;
        let value = if negative { -value } else { value };
        i32::try_from(value).map_err(|_| ParseError::InvalidNumber {
            line,
            text: value.to_string(),
        })
    }

    /// `[-]1.5,`
    pub fn scan_float(&mut self) -> ParseResult<f32> {
        let negative = self.if_punct('-')?;
        let value = self.scan_ufloat()?;
        self.expect_punct(',')?;
        Ok(if negative { -value } else { value })
    }

    /// Non-negative count or index.
    pub fn scan_count(&mut self) -> ParseResult<usize> {
        let line = self.line();
        let value = self.scan_int()?;
        usize::try_from(value).map_err(|_| ParseError::Syntax {
            line,
            message: format!("negative count {value}"),
        })
    }

    pub fn scan_vec3(&mut self) -> ParseResult<Vec3> {
        Ok(Vec3::new(
            self.scan_float()?,
            self.scan_float()?,
            self.scan_float()?,
        ))
    }

    pub fn skip_ints(&mut self, count: usize) -> ParseResult<()> {
        for _ in 0..count {
            self.scan_int()?;
        }
        Ok(())
    }

    pub fn skip_floats(&mut self, count: usize) -> ParseResult<()> {
        for _ in 0..count {
            self.scan_float()?;
        }
        Ok(())
    }

    pub fn skip_strings(&mut self, count: usize) -> ParseResult<()> {
        for _ in 0..count {
            self.scan_string()?;
        }
        Ok(())
    }

    /// Skip an ignored section: an optional name followed by a balanced block.
    pub fn skip_section(&mut self) -> ParseResult<()> {
        if self.kind() == TokenKind::Name {
            self.scan_xsi_name()?;
        }
        self.skip_block()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_names() {
        let mut scan = Scanner::new("MDL-Arm Softimage.OGLMulti.1.0 { brick-diff }").unwrap();
        assert_eq!(scan.scan_xsi_name().unwrap(), "MDL-Arm");
        assert_eq!(scan.scan_xsi_name().unwrap(), "Softimage.OGLMulti.1.0");
        scan.expect_punct('{').unwrap();
        assert_eq!(scan.scan_xsi_name().unwrap(), "brick-diff");
    }

    #[test]
    fn test_name_does_not_swallow_spaced_minus() {
        let mut scan = Scanner::new("Arm -1,").unwrap();
        assert_eq!(scan.scan_xsi_name().unwrap(), "Arm");
        assert_eq!(scan.scan_int().unwrap(), -1);
    }

    #[test]
    fn test_values() {
        let mut scan = Scanner::new(r#"-12, 3.5, -0.25, 4, "XYZ", 1,2,3,"#).unwrap();
        assert_eq!(scan.scan_int().unwrap(), -12);
        assert_eq!(scan.scan_float().unwrap(), 3.5);
        assert_eq!(scan.scan_float().unwrap(), -0.25);
        assert_eq!(scan.scan_float().unwrap(), 4.0);
        assert_eq!(scan.scan_string().unwrap(), "XYZ");
        assert_eq!(scan.scan_vec3().unwrap(), Vec3::new(1.0, 2.0, 3.0));
        assert!(scan.at_end());
    }

    #[test]
    fn test_missing_comma_is_fault() {
        let mut scan = Scanner::new("12 }").unwrap();
        assert!(matches!(scan.scan_int(), Err(ParseError::Syntax { .. })));
    }

    #[test]
    fn test_negative_count_is_fault() {
        let mut scan = Scanner::new("-3,").unwrap();
        assert!(scan.scan_count().is_err());
    }

    #[test]
    fn test_skip_section() {
        let mut scan = Scanner::new("FX-1 { 1, { \"}\", } } next").unwrap();
        scan.skip_section().unwrap();
        assert!(scan.is_name("next"));
    }
}
